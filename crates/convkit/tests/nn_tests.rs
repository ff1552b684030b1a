// Integration tests for the Conv2d layer

use convkit::nn::{init, FanMode};
use convkit::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len());
    for (i, (g, e)) in got.iter().zip(expected.iter()).enumerate() {
        assert!(
            approx_eq(*g, *e, tol),
            "index {}: got {} expected {} (tol {})",
            i,
            g,
            e,
            tol
        );
    }
}

#[test]
fn test_conv2d_layer_forward_shape() -> convkit::Result<()> {
    let conv = Conv2d::<f32>::new(1, 16, [3, 3], [1, 1], [1, 1])?;
    let x = Tensor::<f32>::ones((4, 1, 28, 28))?;
    let y = conv.forward(&x)?;
    assert_eq!(y.dims(), &[4, 16, 28, 28]);

    let strided = Conv2d::<f32>::new(1, 8, [3, 3], [2, 2], [0, 0])?;
    assert_eq!(strided.forward(&x)?.dims(), &[4, 8, 13, 13]);
    Ok(())
}

#[test]
fn test_layer_matches_free_function() -> convkit::Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let weight: Tensor<f64> = init::uniform((3, 2, 3, 3), -0.5, 0.5, &mut rng)?;
    let x: Tensor<f64> = init::uniform((2, 2, 6, 6), -1.0, 1.0, &mut rng)?;
    let params = ConvParams::new([2, 1], [1, 1])?;

    let conv = Conv2d::from_tensors(weight.clone(), params)?
        .with_config(ConvConfig::default().algorithm(ConvAlgorithm::Direct));
    assert_eq!(conv.stride(), [2, 1]);
    assert_eq!(conv.padding(), [1, 1]);

    let expected = conv2d_forward(&x, &weight, params)?;
    assert_vec_approx(&conv.forward(&x)?.to_vec(), &expected.to_vec(), 1e-12);
    Ok(())
}

#[test]
fn test_from_tensors_rejects_non_4d_weight() -> convkit::Result<()> {
    let w = Tensor::<f32>::ones((3, 3))?;
    let err = Conv2d::from_tensors(w, ConvParams::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    Ok(())
}

#[test]
fn test_seeded_layers_are_identical() -> convkit::Result<()> {
    let a = Conv2d::<f32>::with_rng(3, 4, [3, 3], [1, 1], [0, 0], &mut StdRng::seed_from_u64(5))?;
    let b = Conv2d::<f32>::with_rng(3, 4, [3, 3], [1, 1], [0, 0], &mut StdRng::seed_from_u64(5))?;
    assert_eq!(a.weight().to_vec(), b.weight().to_vec());
    Ok(())
}

#[test]
fn test_kaiming_bound_for_layer() -> convkit::Result<()> {
    // fan_in = 4 * 5 * 5 = 100, bound = 1 / sqrt(100)
    let conv = Conv2d::<f64>::with_rng(4, 6, [5, 5], [1, 1], [0, 0], &mut StdRng::seed_from_u64(1))?;
    assert!(conv.weight().to_vec().iter().all(|w| w.abs() <= 0.1));
    let fan_out: Tensor<f64> =
        init::kaiming_uniform((6, 4, 5, 5), 0.0, FanMode::FanOut, &mut StdRng::seed_from_u64(1))?;
    assert_eq!(fan_out.dims(), &[6, 4, 5, 5]);
    Ok(())
}

#[test]
fn test_training_steps_reduce_loss() -> convkit::Result<()> {
    // 0.5 * ||conv(x) - target||², plain gradient descent on the weight
    let mut rng = StdRng::seed_from_u64(31);
    let mut conv = Conv2d::<f64>::with_rng(2, 3, [3, 3], [1, 1], [0, 0], &mut rng)?;
    let x: Tensor<f64> = init::uniform((2, 2, 5, 5), -1.0, 1.0, &mut rng)?;
    let target: Tensor<f64> = init::uniform((2, 3, 3, 3), -1.0, 1.0, &mut rng)?;
    let lr = 1e-3;

    let loss_of = |y: &Tensor<f64>| -> f64 {
        y.to_vec()
            .iter()
            .zip(target.to_vec())
            .map(|(a, b)| 0.5 * (a - b) * (a - b))
            .sum()
    };

    let mut losses = Vec::new();
    for _ in 0..5 {
        let (y, ctx) = conv.forward_train(&x)?;
        losses.push(loss_of(&y));
        let residual: Vec<f64> = y
            .to_vec()
            .iter()
            .zip(target.to_vec())
            .map(|(a, b)| a - b)
            .collect();
        let grad_output = Tensor::from_vec(residual, y.shape().clone())?;
        let grads = conv.backward(ctx, &grad_output)?;
        assert_eq!(grads.grad_input.shape(), x.shape());

        let updated: Vec<f64> = conv
            .weight()
            .to_vec()
            .iter()
            .zip(grads.grad_weight.to_vec())
            .map(|(w, g)| w - lr * g)
            .collect();
        let next = Tensor::from_vec(updated, conv.weight().shape().clone())?;
        conv.set_weight(next)?;
    }
    for pair in losses.windows(2) {
        assert!(pair[1] < pair[0], "loss did not decrease: {:?}", losses);
    }
    Ok(())
}

#[test]
fn test_module_parameters() -> convkit::Result<()> {
    let conv = Conv2d::<f32>::new(3, 8, [3, 3], [1, 1], [1, 1])?;
    let params = conv.parameters();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].dims(), &[8, 3, 3, 3]);
    assert_eq!(conv.num_parameters(), 216);
    Ok(())
}
