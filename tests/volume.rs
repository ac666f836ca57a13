use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array, Array2, Array3, IxDyn};
use pretty_assertions::assert_eq;

use medvol::{MedVol, MedVolError};

fn volume_3d() -> MedVol<f32> {
    MedVol::from_array(Array3::<f32>::zeros((4, 5, 6)))
        .build()
        .unwrap()
}

#[test]
fn builder_defaults() {
    let volume = volume_3d();
    assert_eq!(volume.ndim(), 3);
    assert_eq!(volume.shape(), &[4, 5, 6]);
    assert_eq!(volume.spacing(), DVector::from_element(3, 1.0));
    assert_eq!(volume.origin(), DVector::zeros(3));
    assert_eq!(volume.direction(), DMatrix::<f64>::identity(3, 3));
    assert_eq!(volume.affine(), &DMatrix::<f64>::identity(4, 4));
    assert!(volume.header().is_none());
    assert!(!volume.is_seg());
}

#[test]
fn copy_fields_with_explicit_override() {
    let reference = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .spacing(&[1.0, 1.0, 2.0])
        .origin(&[5.0, 6.0, 7.0])
        .is_seg(true)
        .build()
        .unwrap();

    let derived = MedVol::from_array(Array3::<f32>::ones((2, 2, 2)))
        .spacing(&[2.0, 2.0, 2.0])
        .copy(&reference)
        .build()
        .unwrap();

    assert_eq!(derived.spacing(), DVector::from_vec(vec![2.0, 2.0, 2.0]));
    assert_eq!(derived.origin(), reference.origin());
    assert_eq!(derived.direction(), reference.direction());
    assert!(derived.is_seg());
}

#[test]
fn override_wins_in_either_call_order() {
    let reference = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .spacing(&[3.0, 3.0, 3.0])
        .build()
        .unwrap();

    let a = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .copy(&reference)
        .spacing(&[1.5, 1.5, 1.5])
        .build()
        .unwrap();
    let b = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .spacing(&[1.5, 1.5, 1.5])
        .copy(&reference)
        .build()
        .unwrap();

    assert_eq!(a.spacing(), b.spacing());
    assert_eq!(a.spacing(), DVector::from_vec(vec![1.5, 1.5, 1.5]));
}

#[test]
fn copy_metadata_across_element_types() {
    let reference = MedVol::from_array(Array3::<i16>::zeros((2, 2, 2)))
        .spacing(&[0.5, 0.5, 5.0])
        .build()
        .unwrap();
    let derived = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .copy(&reference)
        .build()
        .unwrap();
    assert_eq!(derived.spacing(), reference.spacing());
}

#[test]
fn rank_outside_two_to_four_is_rejected() {
    let five_d = Array::<f32, _>::zeros(IxDyn(&[2, 2, 2, 2, 2]));
    match MedVol::from_array(five_d).build() {
        Err(MedVolError::ShapeMismatch(_)) => {}
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }

    let one_d = Array::<f32, _>::zeros(IxDyn(&[8]));
    assert!(matches!(
        MedVol::from_array(one_d).build(),
        Err(MedVolError::ShapeMismatch(_))
    ));
}

#[test]
fn copied_fields_must_match_rank() {
    let reference = volume_3d();
    let result = MedVol::from_array(Array2::<f32>::zeros((4, 4)))
        .copy(&reference)
        .build();
    assert!(matches!(result, Err(MedVolError::ShapeMismatch(_))));
}

#[test]
fn mismatched_explicit_fields_are_rejected() {
    let spacing = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .spacing(&[1.0, 1.0])
        .build();
    assert!(matches!(spacing, Err(MedVolError::ShapeMismatch(_))));

    let direction = MedVol::from_array(Array3::<f32>::zeros((2, 2, 2)))
        .direction(DMatrix::<f64>::identity(4, 4))
        .build();
    assert!(matches!(direction, Err(MedVolError::ShapeMismatch(_))));
}

#[test]
fn set_spacing_recomposes_affine() {
    let mut volume = volume_3d();
    volume.set_spacing(&[2.0, 2.0, 4.0]).unwrap();
    assert_eq!(volume.affine()[(0, 0)], 2.0);
    assert_eq!(volume.affine()[(1, 1)], 2.0);
    assert_eq!(volume.affine()[(2, 2)], 4.0);
    assert_eq!(volume.affine()[(3, 3)], 1.0);

    assert!(matches!(
        volume.set_spacing(&[2.0, 2.0]),
        Err(MedVolError::ShapeMismatch(_))
    ));
    assert!(matches!(
        volume.set_spacing(&[2.0, 0.0, 2.0]),
        Err(MedVolError::Geometry(_))
    ));
    assert!(matches!(
        volume.set_spacing(&[2.0, -1.0, 2.0]),
        Err(MedVolError::Geometry(_))
    ));
}

#[test]
fn set_direction_normalizes_and_validates() {
    let mut volume = volume_3d();
    volume.set_spacing(&[1.0, 1.0, 2.0]).unwrap();

    // Scaled columns only contribute orientations.
    let scaled = DMatrix::from_diagonal(&DVector::from_vec(vec![3.0, 3.0, 3.0]));
    volume.set_direction(&scaled).unwrap();
    assert_eq!(volume.direction(), DMatrix::<f64>::identity(3, 3));
    assert_eq!(volume.spacing(), DVector::from_vec(vec![1.0, 1.0, 2.0]));

    let non_square = DMatrix::<f64>::zeros(3, 2);
    assert!(matches!(
        volume.set_direction(&non_square),
        Err(MedVolError::Geometry(_))
    ));

    let singular = DMatrix::from_row_slice(
        3,
        3,
        &[
            1.0, 1.0, 0.0,
            1.0, 1.0, 0.0,
            0.0, 0.0, 1.0,
        ],
    );
    assert!(matches!(
        volume.set_direction(&singular),
        Err(MedVolError::Geometry(_))
    ));
}

#[test]
fn set_affine_back_decomposes() {
    let mut volume = volume_3d();
    let angle = 0.5_f64;
    let direction = DMatrix::from_row_slice(
        3,
        3,
        &[
            angle.cos(), -angle.sin(), 0.0,
            angle.sin(), angle.cos(), 0.0,
            0.0, 0.0, 1.0,
        ],
    );
    let spacing = DVector::from_vec(vec![0.7, 0.7, 3.0]);
    let origin = DVector::from_vec(vec![-1.0, 2.0, 3.5]);

    let mut affine = DMatrix::<f64>::identity(4, 4);
    for j in 0..3 {
        for i in 0..3 {
            affine[(i, j)] = direction[(i, j)] * spacing[j];
        }
        affine[(j, 3)] = origin[j];
    }
    volume.set_affine(&affine).unwrap();

    assert_abs_diff_eq!(volume.direction(), direction, epsilon = 1e-12);
    assert_abs_diff_eq!(volume.spacing(), spacing, epsilon = 1e-12);
    assert_abs_diff_eq!(volume.origin(), origin, epsilon = 1e-12);
}

#[test]
fn malformed_affine_is_rejected() {
    let mut volume = volume_3d();

    let mut bad_row = DMatrix::<f64>::identity(4, 4);
    bad_row[(3, 1)] = 0.25;
    assert!(matches!(
        volume.set_affine(&bad_row),
        Err(MedVolError::Geometry(_))
    ));

    let wrong_size = DMatrix::<f64>::identity(3, 3);
    assert!(matches!(
        volume.set_affine(&wrong_size),
        Err(MedVolError::ShapeMismatch(_))
    ));

    let mut zero_column = DMatrix::<f64>::identity(4, 4);
    zero_column[(1, 1)] = 0.0;
    assert!(matches!(
        volume.set_affine(&zero_column),
        Err(MedVolError::Geometry(_))
    ));
}

#[test]
fn in_place_mutation_is_visible() {
    let mut volume = volume_3d();
    volume.array_mut()[[1, 2, 3]] = 42.0;
    assert_eq!(volume.array()[[1, 2, 3]], 42.0);

    let replacement = Array3::<f32>::ones((4, 5, 6));
    volume.set_array(replacement).unwrap();
    assert_eq!(volume.array()[[0, 0, 0]], 1.0);

    let wrong_shape = Array3::<f32>::zeros((4, 5, 7));
    assert!(matches!(
        volume.set_array(wrong_shape),
        Err(MedVolError::ShapeMismatch(_))
    ));
}

#[test]
fn scale_equals_spacing_for_orthonormal_direction() {
    let mut volume = volume_3d();
    volume.set_spacing(&[1.0, 1.5, 3.0]).unwrap();
    let (rotation, scale, shear) = volume.rotation_scale_shear();
    assert_abs_diff_eq!(rotation, DMatrix::<f64>::identity(3, 3), epsilon = 1e-12);
    assert_abs_diff_eq!(scale, DVector::from_vec(vec![1.0, 1.5, 3.0]), epsilon = 1e-12);
    assert_abs_diff_eq!(shear, DMatrix::<f64>::identity(3, 3), epsilon = 1e-12);
}

#[test]
fn factor_setters_recompose() {
    let mut volume = volume_3d();
    volume.set_scale(&[2.0, 2.0, 2.0]).unwrap();
    assert_abs_diff_eq!(
        volume.spacing(),
        DVector::from_vec(vec![2.0, 2.0, 2.0]),
        epsilon = 1e-12
    );

    let quarter_turn = DMatrix::from_row_slice(
        3,
        3,
        &[
            0.0, -1.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
        ],
    );
    volume.set_rotation(&quarter_turn).unwrap();
    assert_abs_diff_eq!(volume.rotation(), quarter_turn, epsilon = 1e-12);
    // An orthonormal direction change leaves the spacing alone.
    assert_abs_diff_eq!(
        volume.spacing(),
        DVector::from_vec(vec![2.0, 2.0, 2.0]),
        epsilon = 1e-12
    );

    let mut shear = DMatrix::<f64>::identity(3, 3);
    shear[(0, 1)] = 0.25;
    volume.set_shear(&shear).unwrap();
    assert_abs_diff_eq!(volume.shear(), shear, epsilon = 1e-12);

    let not_orthogonal = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 1.0, 1.0]));
    assert!(matches!(
        volume.set_rotation(&not_orthogonal),
        Err(MedVolError::Geometry(_))
    ));
    let mut lower = DMatrix::<f64>::identity(3, 3);
    lower[(2, 0)] = 0.5;
    assert!(matches!(
        volume.set_shear(&lower),
        Err(MedVolError::Geometry(_))
    ));
}

#[test]
fn origin_setter_leaves_linear_block_alone() {
    let mut volume = volume_3d();
    volume.set_spacing(&[1.0, 2.0, 3.0]).unwrap();
    volume.set_origin(&[10.0, 20.0, 30.0]).unwrap();
    assert_eq!(volume.origin(), DVector::from_vec(vec![10.0, 20.0, 30.0]));
    assert_eq!(volume.spacing(), DVector::from_vec(vec![1.0, 2.0, 3.0]));
    assert!(matches!(
        volume.set_origin(&[f64::NAN, 0.0, 0.0]),
        Err(MedVolError::Geometry(_))
    ));
}
