//! Byte-level codec for the X-Plane UDP wire protocol: the BECN multicast
//! beacon, and the unicast RREF (subscribe + response)/CMND/DREF frames.
//!
//! All multi-byte integers are little-endian, matching X-Plane's own wire
//! format on every platform it ships for.

use bridge_model::BridgeError;

// ── Frame sizes & magics ──────────────────────────────────────────────────────

pub const BEACON_MAGIC: &[u8; 5] = b"BECN\0";
pub const RREF_REQUEST_MAGIC: &[u8; 5] = b"RREF\0";
pub const RREF_RESPONSE_MAGIC: &[u8; 5] = b"RREF,";
pub const DREF_MAGIC: &[u8; 5] = b"DREF\0";
pub const CMND_MAGIC: &[u8; 5] = b"CMND0";

const RREF_PATH_FIELD_LEN: usize = 400;
const DREF_PATH_FIELD_LEN: usize = 500;

/// Total length of an RREF subscribe/unsubscribe frame.
pub const RREF_REQUEST_LEN: usize = 5 + 4 + 4 + RREF_PATH_FIELD_LEN;
/// Total length of a DREF write frame.
pub const DREF_FRAME_LEN: usize = 5 + 4 + DREF_PATH_FIELD_LEN;
/// Maximum bytes of an RREF response datagram (Ethernet MTU minus IP/UDP headers).
pub const MAX_DATAGRAM_LEN: usize = 1472;

// ── Beacon ─────────────────────────────────────────────────────────────────────

/// Parsed BECN beacon payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub major_version: u8,
    pub minor_version: u8,
    pub app_host_id: i32,
    pub xplane_version: i32,
    pub role: u32,
    pub port: u16,
    pub hostname: String,
}

impl Beacon {
    /// Whether this beacon is from a version of X-Plane this bridge supports.
    pub fn is_supported(&self) -> bool {
        self.major_version == 1 && self.minor_version <= 2 && self.app_host_id == 1
    }
}

/// Parse a raw BECN multicast datagram.
///
/// Returns [`BridgeError::Protocol`] if the header doesn't match, and
/// [`BridgeError::ConnectionVersion`] if the header matches but the
/// reported version isn't one this bridge accepts — distinguishing a
/// garbled packet from a real-but-unsupported simulator.
pub fn parse_beacon(data: &[u8]) -> Result<Beacon, BridgeError> {
    if data.len() < 21 {
        return Err(BridgeError::Protocol { header: hex_prefix(data) });
    }
    if &data[0..5] != BEACON_MAGIC {
        return Err(BridgeError::Protocol { header: hex_prefix(data) });
    }

    let mut pos = 5;
    let major_version = data[pos];
    pos += 1;
    let minor_version = data[pos];
    pos += 1;
    let app_host_id = read_i32(data, &mut pos);
    let xplane_version = read_i32(data, &mut pos);
    let role = read_u32(data, &mut pos);
    let port = read_u16(data, &mut pos);

    let hostname_bytes = &data[pos..];
    let hostname_end = hostname_bytes.iter().position(|&b| b == 0).unwrap_or(hostname_bytes.len());
    let hostname = String::from_utf8_lossy(&hostname_bytes[..hostname_end]).into_owned();

    let beacon = Beacon {
        major_version,
        minor_version,
        app_host_id,
        xplane_version,
        role,
        port,
        hostname,
    };

    if !beacon.is_supported() {
        return Err(BridgeError::ConnectionVersion { major: beacon.major_version, minor: beacon.minor_version });
    }
    Ok(beacon)
}

fn hex_prefix(data: &[u8]) -> String {
    data.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

// ── RREF request (subscribe/unsubscribe) ──────────────────────────────────────

/// Build a 413-byte RREF subscribe/unsubscribe frame. `freq == 0` unsubscribes.
pub fn encode_rref_request(freq: i32, index: i32, path: &str) -> [u8; RREF_REQUEST_LEN] {
    let mut buf = [0u8; RREF_REQUEST_LEN];
    let mut pos = 0;
    write_bytes(&mut buf, &mut pos, RREF_REQUEST_MAGIC);
    write_i32(&mut buf, &mut pos, freq);
    write_i32(&mut buf, &mut pos, index);
    write_path_zero_padded(&mut buf, pos, path, RREF_PATH_FIELD_LEN);
    buf
}

/// Decode an RREF subscribe/unsubscribe frame back into its fields. Used by
/// round-trip tests; the simulator never sends this frame back to us.
pub fn decode_rref_request(data: &[u8]) -> Option<(i32, i32, String)> {
    if data.len() != RREF_REQUEST_LEN || &data[0..5] != RREF_REQUEST_MAGIC {
        return None;
    }
    let mut pos = 5;
    let freq = read_i32(data, &mut pos);
    let index = read_i32(data, &mut pos);
    let path = read_cstring(&data[pos..pos + RREF_PATH_FIELD_LEN]);
    Some((freq, index, path))
}

/// Decode an inbound RREF response datagram into `(index, value)` pairs.
///
/// Returns [`BridgeError::Protocol`] if the header doesn't match; unknown
/// headers are the caller's responsibility to log and drop.
pub fn decode_rref_response(data: &[u8]) -> Result<Vec<(i32, f32)>, BridgeError> {
    if data.len() < 5 || &data[0..5] != RREF_RESPONSE_MAGIC {
        return Err(BridgeError::Protocol { header: hex_prefix(data) });
    }
    let body = &data[5..];
    let record_len = 8;
    let count = body.len() / record_len;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let rec = &body[i * record_len..(i + 1) * record_len];
        let mut pos = 0;
        let index = read_i32(rec, &mut pos);
        let value = read_f32(rec, &mut pos);
        out.push((index, value));
    }
    Ok(out)
}

// ── CMND (execute command) ────────────────────────────────────────────────────

/// Build a CMND frame: the literal `"CMND0"` immediately followed by the
/// command path, with no padding or terminator.
pub fn encode_cmnd(path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CMND_MAGIC.len() + path.len());
    buf.extend_from_slice(CMND_MAGIC);
    buf.extend_from_slice(path.as_bytes());
    buf
}

// ── DREF (write dataref) ───────────────────────────────────────────────────────

/// Typed value for a DREF write, matching the three encodings X-Plane accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrefValue {
    Float(f32),
    Int(i32),
    UInt(u32),
}

/// Build a 509-byte DREF write frame.
pub fn encode_dref(path: &str, value: DrefValue) -> [u8; DREF_FRAME_LEN] {
    let mut buf = [0u8; DREF_FRAME_LEN];
    let mut pos = 0;
    write_bytes(&mut buf, &mut pos, DREF_MAGIC);
    match value {
        DrefValue::Float(v) => write_f32(&mut buf, &mut pos, v),
        DrefValue::Int(v) => write_i32(&mut buf, &mut pos, v),
        DrefValue::UInt(v) => write_u32(&mut buf, &mut pos, v),
    }
    write_path_space_padded_nul_terminated(&mut buf, pos, path, DREF_PATH_FIELD_LEN);
    buf
}

// ── byte helpers ───────────────────────────────────────────────────────────────

fn write_bytes(buf: &mut [u8], pos: &mut usize, bytes: &[u8]) {
    buf[*pos..*pos + bytes.len()].copy_from_slice(bytes);
    *pos += bytes.len();
}

fn write_i32(buf: &mut [u8], pos: &mut usize, v: i32) {
    buf[*pos..*pos + 4].copy_from_slice(&v.to_le_bytes());
    *pos += 4;
}

fn write_u32(buf: &mut [u8], pos: &mut usize, v: u32) {
    buf[*pos..*pos + 4].copy_from_slice(&v.to_le_bytes());
    *pos += 4;
}

fn write_f32(buf: &mut [u8], pos: &mut usize, v: f32) {
    buf[*pos..*pos + 4].copy_from_slice(&v.to_le_bytes());
    *pos += 4;
}

fn write_path_zero_padded(buf: &mut [u8], pos: usize, path: &str, field_len: usize) {
    let bytes = path.as_bytes();
    let n = bytes.len().min(field_len);
    buf[pos..pos + n].copy_from_slice(&bytes[..n]);
    // remainder of the field is already zero from the buffer's initialization
}

fn write_path_space_padded_nul_terminated(buf: &mut [u8], pos: usize, path: &str, field_len: usize) {
    for b in buf[pos..pos + field_len].iter_mut() {
        *b = b' ';
    }
    let mut bytes: Vec<u8> = path.as_bytes().to_vec();
    bytes.push(0);
    let n = bytes.len().min(field_len);
    buf[pos..pos + n].copy_from_slice(&bytes[..n]);
}

fn read_i32(buf: &[u8], pos: &mut usize) -> i32 {
    let v = i32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u32(buf: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_u16(buf: &[u8], pos: &mut usize) -> u16 {
    let v = u16::from_le_bytes(buf[*pos..*pos + 2].try_into().unwrap());
    *pos += 2;
    v
}

fn read_f32(buf: &[u8], pos: &mut usize) -> f32 {
    let v = f32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    v
}

fn read_cstring(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_beacon_packet(hostname: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(BEACON_MAGIC);
        buf.push(1); // major
        buf.push(1); // minor
        buf.extend_from_slice(&1i32.to_le_bytes()); // appHostId
        buf.extend_from_slice(&120000i32.to_le_bytes()); // xplaneVersion
        buf.extend_from_slice(&1u32.to_le_bytes()); // role
        buf.extend_from_slice(&49000u16.to_le_bytes()); // port
        buf.extend_from_slice(hostname.as_bytes());
        buf.push(0);
        buf
    }

    #[test]
    fn beacon_accepted_within_supported_version() {
        let packet = sample_beacon_packet("rig");
        let beacon = parse_beacon(&packet).unwrap();
        assert_eq!(beacon.hostname, "rig");
        assert_eq!(beacon.port, 49000);
        assert!(beacon.is_supported());
    }

    #[test]
    fn beacon_rejects_unsupported_minor_version() {
        let mut packet = sample_beacon_packet("rig");
        packet[6] = 3; // minor = 3, exceeds accepted <= 2
        let err = parse_beacon(&packet).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionVersion { .. }));
    }

    #[test]
    fn beacon_rejects_bad_magic() {
        let mut packet = sample_beacon_packet("rig");
        packet[0] = b'X';
        assert!(parse_beacon(&packet).is_err());
    }

    #[test]
    fn rref_request_round_trips() {
        let frame = encode_rref_request(1, 42, "sim/cockpit/alt");
        assert_eq!(frame.len(), RREF_REQUEST_LEN);
        let (freq, index, path) = decode_rref_request(&frame).unwrap();
        assert_eq!(freq, 1);
        assert_eq!(index, 42);
        assert_eq!(path, "sim/cockpit/alt");
    }

    #[test]
    fn rref_response_decodes_multiple_values() {
        let mut data = Vec::new();
        data.extend_from_slice(RREF_RESPONSE_MAGIC);
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&12345.0f32.to_le_bytes());
        data.extend_from_slice(&8i32.to_le_bytes());
        data.extend_from_slice(&1.5f32.to_le_bytes());

        let values = decode_rref_response(&data).unwrap();
        assert_eq!(values, vec![(7, 12345.0), (8, 1.5)]);
    }

    #[test]
    fn rref_response_rejects_bad_header() {
        assert!(decode_rref_response(b"XXXXX\0\0\0\0\0\0\0\0").is_err());
    }

    #[test]
    fn cmnd_frame_has_no_padding() {
        let frame = encode_cmnd("sim/engines/starter_1");
        assert_eq!(frame, b"CMND0sim/engines/starter_1");
    }

    #[test]
    fn dref_frame_is_exact_length_and_space_padded() {
        let frame = encode_dref("sim/cockpit/radios/nav1", DrefValue::Float(110.5));
        assert_eq!(frame.len(), DREF_FRAME_LEN);
        assert_eq!(&frame[0..5], DREF_MAGIC);
        let value = f32::from_le_bytes(frame[5..9].try_into().unwrap());
        assert!((value - 110.5).abs() < 0.001);
        assert_eq!(frame[9], b's');
        // trailing bytes beyond the NUL terminator must be spaces
        assert_eq!(*frame.last().unwrap(), b' ');
    }

    #[test]
    fn dref_int_and_uint_encodings() {
        let int_frame = encode_dref("sim/x", DrefValue::Int(-7));
        let value = i32::from_le_bytes(int_frame[5..9].try_into().unwrap());
        assert_eq!(value, -7);

        let uint_frame = encode_dref("sim/x", DrefValue::UInt(1));
        let value = u32::from_le_bytes(uint_frame[5..9].try_into().unwrap());
        assert_eq!(value, 1);
    }
}
