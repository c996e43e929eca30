//! `multipart/x-mixed-replace` framing
//!
//! Each frame becomes one part:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```
//!
//! The part is emitted as three chunks so the JPEG payload is the frame's
//! own shared buffer rather than a per-client copy.

use bytes::{BufMut, Bytes, BytesMut};

use crate::capture::Frame;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// MIME type of each part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

const PART_TRAILER: &[u8] = b"\r\n";

/// `Content-Type` header value for the whole response
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Boundary line and part headers for a payload of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    let mut header = BytesMut::with_capacity(80);
    header.put_slice(b"--");
    header.put_slice(BOUNDARY.as_bytes());
    header.put_slice(b"\r\nContent-Type: ");
    header.put_slice(PART_CONTENT_TYPE.as_bytes());
    header.put_slice(format!("\r\nContent-Length: {}\r\n\r\n", len).as_bytes());
    header.freeze()
}

/// The chunks that make up one part, in write order
pub fn part_chunks(frame: &Frame) -> [Bytes; 3] {
    [
        part_header(frame.len()),
        frame.data.clone(),
        Bytes::from_static(PART_TRAILER),
    ]
}

/// One part as a single contiguous buffer
pub fn encode_part(frame: &Frame) -> Bytes {
    let [header, data, trailer] = part_chunks(frame);
    let mut part = BytesMut::with_capacity(header.len() + data.len() + trailer.len());
    part.put(header);
    part.put(data);
    part.put(trailer);
    part.freeze()
}
