//! Unit tests for inbound framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use wirequeue::codec::{FrameCodec, Framing};
use wirequeue::AppError;

const MAX: usize = 1024;

#[test]
fn raw_yields_whatever_is_buffered() {
    let mut codec = FrameCodec::new(Framing::Raw, MAX).expect("codec");
    let mut buf = BytesMut::from(&b"hello wire"[..]);

    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame.as_deref(), Some(&b"hello wire"[..]));
    assert!(buf.is_empty());
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
}

#[test]
fn fixed_waits_for_full_length() {
    let mut codec = FrameCodec::new(Framing::Fixed { length: 4 }, MAX).expect("codec");
    let mut buf = BytesMut::from(&b"ab"[..]);

    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"cdef");
    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame.as_deref(), Some(&b"abcd"[..]));
    assert_eq!(&buf[..], b"ef", "remainder stays buffered");
}

#[test]
fn fixed_splits_batched_messages() {
    let mut codec = FrameCodec::new(Framing::Fixed { length: 3 }, MAX).expect("codec");
    let mut buf = BytesMut::from(&b"onetwo"[..]);

    let first = codec.decode(&mut buf).expect("decode");
    let second = codec.decode(&mut buf).expect("decode");
    let third = codec.decode(&mut buf).expect("decode");

    assert_eq!(first.as_deref(), Some(&b"one"[..]));
    assert_eq!(second.as_deref(), Some(&b"two"[..]));
    assert_eq!(third, None);
}

#[test]
fn length_header_counts_itself_and_is_kept() {
    let mut codec = FrameCodec::new(Framing::LengthHeader { header_size: 2 }, MAX).expect("codec");
    // Total length 5 = 2 header bytes + "hi!".
    let mut buf = BytesMut::from(&[0x00, 0x05, b'h', b'i', b'!', 0x00, 0x03][..]);

    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame.as_deref(), Some(&[0x00, 0x05, b'h', b'i', b'!'][..]));

    // Second frame header arrived, body did not.
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);
    buf.extend_from_slice(b"x");
    let frame = codec.decode(&mut buf).expect("decode");
    assert_eq!(frame.as_deref(), Some(&[0x00, 0x03, b'x'][..]));
}

#[test]
fn length_header_over_limit_is_read_error() {
    let mut codec = FrameCodec::new(Framing::LengthHeader { header_size: 2 }, 16).expect("codec");
    let mut buf = BytesMut::from(&[0x01, 0x00][..]);

    match codec.decode(&mut buf) {
        Err(AppError::Read(msg)) => assert!(msg.contains("framing error"), "got: {msg}"),
        other => panic!("expected Err(AppError::Read), got: {other:?}"),
    }
}

#[test]
fn invalid_framing_is_rejected_at_construction() {
    assert!(matches!(
        FrameCodec::new(Framing::Fixed { length: 0 }, MAX),
        Err(AppError::Config(_))
    ));
    assert!(matches!(
        FrameCodec::new(Framing::LengthHeader { header_size: 0 }, MAX),
        Err(AppError::Config(_))
    ));
}

#[test]
fn length_header_frames_match_every_header_width() {
    for header_size in 1..=8usize {
        let mut codec =
            FrameCodec::new(Framing::LengthHeader { header_size }, MAX).expect("codec");

        let mut buf = BytesMut::new();
        let mut expected = Vec::new();
        for body in [&b"abc"[..], &b"z"[..], &b"payload!"[..]] {
            let total = u64::try_from(header_size + body.len()).unwrap();
            let header = &total.to_be_bytes()[8 - header_size..];
            let mut frame = header.to_vec();
            frame.extend_from_slice(body);
            buf.extend_from_slice(&frame);
            expected.push(frame);
        }

        for frame in expected {
            let decoded = codec.decode(&mut buf).expect("decode");
            assert_eq!(
                decoded.as_deref(),
                Some(frame.as_slice()),
                "header_size {header_size}"
            );
        }
        assert!(buf.is_empty(), "header_size {header_size}: leftover bytes");
    }
}

#[test]
fn length_header_smaller_than_header_is_read_error() {
    let mut codec = FrameCodec::new(Framing::LengthHeader { header_size: 2 }, MAX).expect("codec");
    let mut buf = BytesMut::from(&[0x00, 0x01, b'x'][..]);

    match codec.decode(&mut buf) {
        Err(AppError::Read(msg)) => assert!(msg.contains("smaller than"), "got: {msg}"),
        other => panic!("expected Err(AppError::Read), got: {other:?}"),
    }
}
