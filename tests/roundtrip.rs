//! Save/reload behavior across both formats.

use std::fs;
use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3, Array4, ShapeBuilder};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use medvol::{MedVol, MedVolError, VolumeHeader};

fn get_temporary_path(name: &str) -> PathBuf {
    let dir = tempdir().unwrap();
    let mut path = dir.into_path();
    path.push(name);
    path
}

fn counting_array3(shape: (usize, usize, usize)) -> Array3<f32> {
    let len = shape.0 * shape.1 * shape.2;
    Array3::from_shape_vec(shape.f(), (0..len).map(|i| i as f32).collect()).unwrap()
}

/// Load a 3D volume, check its geometry, change the spacing, convert to
/// NRRD, and read it back.
#[test]
fn nifti_scenario_with_nrrd_conversion() {
    let nii_path = get_temporary_path("scenario.nii.gz");
    let nrrd_path = get_temporary_path("scenario.nrrd");

    let original = MedVol::from_array(counting_array3((64, 64, 40)))
        .spacing(&[1.0, 1.0, 2.0])
        .build()
        .unwrap();
    original.save(&nii_path).unwrap();

    let mut volume = MedVol::<f32>::open(&nii_path).unwrap();
    assert_eq!(volume.shape(), &[64, 64, 40]);
    assert_abs_diff_eq!(
        volume.spacing(),
        DVector::from_vec(vec![1.0, 1.0, 2.0]),
        epsilon = 1e-6
    );
    // Identity direction: the affine diagonal is exactly the spacing.
    for (i, expected) in [1.0, 1.0, 2.0].iter().enumerate() {
        assert_abs_diff_eq!(volume.affine()[(i, i)], *expected, epsilon = 1e-6);
    }
    assert_eq!(volume.array(), original.array());
    assert!(matches!(volume.header(), Some(VolumeHeader::Nifti(_))));

    volume.set_spacing(&[2.0, 2.0, 2.0]).unwrap();
    for i in 0..3 {
        assert_abs_diff_eq!(volume.affine()[(i, i)], 2.0, epsilon = 1e-12);
    }

    volume.save(&nrrd_path).unwrap();
    let reloaded = MedVol::<f32>::open(&nrrd_path).unwrap();
    assert_eq!(reloaded.array(), volume.array());
    assert_abs_diff_eq!(
        reloaded.spacing(),
        DVector::from_vec(vec![2.0, 2.0, 2.0]),
        epsilon = 1e-12
    );
    assert!(matches!(reloaded.header(), Some(VolumeHeader::Nrrd(_))));
}

#[test]
fn nifti_preserves_direction_and_origin() {
    let path = get_temporary_path("oblique.nii");
    let angle = 0.25_f64;
    let direction = DMatrix::from_row_slice(
        3,
        3,
        &[
            angle.cos(), -angle.sin(), 0.0,
            angle.sin(), angle.cos(), 0.0,
            0.0, 0.0, 1.0,
        ],
    );

    let mut volume = MedVol::from_array(counting_array3((8, 8, 4)))
        .spacing(&[0.5, 0.5, 3.0])
        .origin(&[-20.0, 14.5, 7.0])
        .build()
        .unwrap();
    volume.set_direction(&direction).unwrap();
    volume.save(&path).unwrap();

    let reloaded = MedVol::<f32>::open(&path).unwrap();
    // Geometry goes through f32 header fields on disk.
    assert_abs_diff_eq!(reloaded.direction(), direction, epsilon = 1e-6);
    assert_abs_diff_eq!(
        reloaded.origin(),
        DVector::from_vec(vec![-20.0, 14.5, 7.0]),
        epsilon = 1e-5
    );
    assert_abs_diff_eq!(
        reloaded.spacing(),
        DVector::from_vec(vec![0.5, 0.5, 3.0]),
        epsilon = 1e-6
    );
    assert_eq!(reloaded.array(), volume.array());
}

#[test]
fn nifti_2d_round_trip() {
    let path = get_temporary_path("slice.nii.gz");
    let data = Array2::from_shape_vec((6, 5).f(), (0..30).map(|i| i as f32).collect()).unwrap();
    let volume = MedVol::from_array(data)
        .spacing(&[0.5, 0.75])
        .origin(&[3.0, -2.0])
        .build()
        .unwrap();
    volume.save(&path).unwrap();

    let reloaded = MedVol::<f32>::open(&path).unwrap();
    assert_eq!(reloaded.ndim(), 2);
    assert_abs_diff_eq!(
        reloaded.spacing(),
        DVector::from_vec(vec![0.5, 0.75]),
        epsilon = 1e-6
    );
    assert_eq!(reloaded.array(), volume.array());
}

#[test]
fn nrrd_4d_round_trip_keeps_fourth_axis_geometry() {
    let path = get_temporary_path("dynamic.nrrd");
    let data = Array4::from_shape_vec(
        (6, 5, 4, 3).f(),
        (0..360).map(|i| i as f32).collect(),
    )
    .unwrap();
    let volume = MedVol::from_array(data)
        .spacing(&[1.0, 1.0, 2.0, 2.5])
        .origin(&[0.0, 0.0, -10.0, 30.0])
        .is_seg(true)
        .build()
        .unwrap();
    volume.save(&path).unwrap();

    let reloaded = MedVol::<f32>::open(&path).unwrap();
    assert_eq!(reloaded.array(), volume.array());
    assert_abs_diff_eq!(
        reloaded.affine().clone(),
        volume.affine().clone(),
        epsilon = 1e-12
    );
    assert!(reloaded.is_seg());
}

#[test]
fn four_dimensional_nifti_save_is_refused() {
    let path = get_temporary_path("refused.nii.gz");
    let data = Array4::<f32>::zeros((4, 4, 4, 2));
    let volume = MedVol::from_array(data).build().unwrap();
    match volume.save(&path) {
        Err(MedVolError::UnsupportedOperation(_)) => {}
        other => panic!("expected UnsupportedOperation, got {:?}", other),
    }
    // Refusal happens before the destination is created.
    assert!(!path.exists());
}

#[test]
fn unknown_extensions_are_rejected() {
    assert!(matches!(
        MedVol::<f32>::open("volume.xyz"),
        Err(MedVolError::UnsupportedFormat(_))
    ));
    let volume = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .build()
        .unwrap();
    assert!(matches!(
        volume.save("volume.xyz"),
        Err(MedVolError::UnsupportedFormat(_))
    ));
}

#[test]
fn is_seg_marker_survives_nifti() {
    let path = get_temporary_path("mask.nii.gz");
    let volume = MedVol::from_array(Array3::<f32>::ones((4, 4, 4)))
        .is_seg(true)
        .build()
        .unwrap();
    volume.save(&path).unwrap();
    let reloaded = MedVol::<f32>::open(&path).unwrap();
    assert!(reloaded.is_seg());

    let plain_path = get_temporary_path("image.nii.gz");
    let plain = MedVol::from_array(Array3::<f32>::ones((4, 4, 4)))
        .build()
        .unwrap();
    plain.save(&plain_path).unwrap();
    assert!(!MedVol::<f32>::open(&plain_path).unwrap().is_seg());
}

#[test]
fn raw_big_endian_nrrd_is_read() {
    let path = get_temporary_path("legacy.nrrd");
    let mut bytes = b"NRRD0004\n\
        type: int16\n\
        dimension: 2\n\
        sizes: 2 2\n\
        endian: big\n\
        encoding: raw\n\
        \n"
    .to_vec();
    bytes.extend_from_slice(&[0, 1, 0, 2, 0, 3, 0, 4]);
    fs::write(&path, bytes).unwrap();

    let volume = MedVol::<i16>::open(&path).unwrap();
    assert_eq!(volume.shape(), &[2, 2]);
    // Samples are stored fastest axis first.
    assert_eq!(volume.array()[[0, 0]], 1);
    assert_eq!(volume.array()[[1, 0]], 2);
    assert_eq!(volume.array()[[0, 1]], 3);
    assert_eq!(volume.array()[[1, 1]], 4);
}

#[test]
fn nrrd_key_values_pass_through_on_save() {
    let source = get_temporary_path("annotated.nrrd");
    let copied = get_temporary_path("annotated_copy.nrrd");
    let mut bytes = b"NRRD0004\n\
        type: uint8\n\
        dimension: 2\n\
        sizes: 2 3\n\
        encoding: raw\n\
        site:=hospital-1\n\
        \n"
    .to_vec();
    bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
    fs::write(&source, bytes).unwrap();

    let volume = MedVol::<u8>::open(&source).unwrap();
    volume.save(&copied).unwrap();

    let reloaded = MedVol::<u8>::open(&copied).unwrap();
    let header = match reloaded.header() {
        Some(VolumeHeader::Nrrd(header)) => header,
        other => panic!("expected an NRRD header, got {:?}", other),
    };
    assert_eq!(
        header.key_values.get("site").map(String::as_str),
        Some("hospital-1")
    );
    assert_eq!(reloaded.array(), volume.array());
}

#[test]
fn samples_convert_to_wider_element_types() {
    let path = get_temporary_path("narrow.nrrd");
    let volume = MedVol::from_array(counting_array3((3, 3, 3)))
        .spacing(&[1.0, 1.0, 1.5])
        .build()
        .unwrap();
    volume.save(&path).unwrap();

    let widened = MedVol::<f64>::open(&path).unwrap();
    assert_eq!(widened.shape(), &[3, 3, 3]);
    for (a, b) in widened.array().iter().zip(volume.array().iter()) {
        assert_eq!(*a, f64::from(*b));
    }
}

#[test]
fn fourth_axis_metadata_from_plain_nifti_headers() {
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;

    let path = get_temporary_path("timeseries.nii");
    let data = Array4::<f32>::zeros((4, 4, 4, 5));
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0, 1.0, 1.0, 1.0, 2.5, 0.0, 0.0, 0.0];
    header.toffset = 10.0;
    WriterOptions::new(&path)
        .reference_header(&header)
        .write_nifti(&data)
        .unwrap();

    let volume = MedVol::<f32>::open(&path).unwrap();
    assert_eq!(volume.ndim(), 4);
    // Time step and offset come from pixdim[4] and toffset.
    assert_abs_diff_eq!(volume.spacing()[3], 2.5, epsilon = 1e-6);
    assert_abs_diff_eq!(volume.origin()[3], 10.0, epsilon = 1e-6);
}
