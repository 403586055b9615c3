use candle_core::{DType, Device, Tensor};
use lexsearch_embed::masked_mean_l2;

#[test]
fn masked_mean_l2_ignores_padding() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; the second is padding.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,
                                 5.0, 6.0, 7.0, 8.0],
                               (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
    let expected = [1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm];
    for (a, b) in v[0].iter().copied().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn masked_mean_l2_averages_each_row_separately() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[3.0f32, 0.0,  1.0, 0.0,
                                 0.0, 2.0,  0.0, 4.0],
                               (2, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 1, 1, 1], (2, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!((v[0][0] - 1.0).abs() < 1e-5 && v[0][1].abs() < 1e-5);
    assert!(v[1][0].abs() < 1e-5 && (v[1][1] - 1.0).abs() < 1e-5);
}
