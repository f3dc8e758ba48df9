mod common;

use std::io::Cursor;

use common::test_utils::{argb8_dds, argb8_dds_header};
use pmx_preview::data_structures::dds::{self, FormatError, TargetFormat};

#[test]
fn decodes_4x4_argb8_container() {
    let bytes = argb8_dds(4, 4, [10, 20, 30, 255]);
    let decoded = dds::decode(&mut Cursor::new(&bytes)).unwrap();

    assert_eq!(decoded.width, 4);
    assert_eq!(decoded.height, 4);
    assert_eq!(decoded.format, TargetFormat::Rgba8);
    assert_eq!(decoded.pitch, 16);
    assert_eq!(decoded.data.len(), bytes.len() - 128);
    assert_eq!(&decoded.data[..4], &[10, 20, 30, 255]);
    // stored as BGRA, uploaded as RGBA
    assert!(decoded.swap_rb());
}

#[test]
fn payload_is_everything_after_the_header() {
    let mut bytes = argb8_dds(4, 4, [0, 0, 0, 255]);
    bytes.extend_from_slice(&[1, 2, 3]);
    let decoded = dds::decode(&mut Cursor::new(&bytes)).unwrap();
    assert_eq!(decoded.data.len(), 4 * 4 * 4 + 3);
    assert_eq!(&decoded.data[decoded.data.len() - 3..], &[1, 2, 3]);
}

#[test]
fn header_fields_are_reported_verbatim() {
    for (width, height) in [(1, 1), (3, 7), (256, 128)] {
        let bytes = argb8_dds_header(width, height);
        let decoded = dds::decode(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!((decoded.width, decoded.height), (width, height));
        assert!(decoded.data.is_empty());
    }
}

#[test]
fn other_formats_are_not_containers() {
    let png_magic = b"\x89PNG\r\n\x1a\n".to_vec();
    assert!(!dds::has_dds_magic(&png_magic));
    assert!(dds::has_dds_magic(&argb8_dds_header(1, 1)));
    assert!(matches!(
        dds::decode(&mut Cursor::new(&png_magic)),
        Err(FormatError::Io(_))
    ));
}
