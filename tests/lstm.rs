use lagvae::layers::{LinearT, Lstm};
use lagvae::math::Matrix;

#[test]
fn linear_backward_accumulates_the_outer_product() {
    let mut fc = LinearT::new(3, 2);
    let before = fc.w.clone();
    let x = Matrix::from_vec(1, 3, vec![0.5, -1.0, 2.0]);
    fc.forward_train(&x);
    // loss = sum of outputs, so d loss / d w[i][j] = x[i]
    fc.backward(&Matrix::from_vec(1, 2, vec![1.0, 1.0]));
    fc.sgd_step(1.0);
    for i in 0..3 {
        for j in 0..2 {
            let applied = before.get(i, j) - fc.w.get(i, j);
            assert!(
                (applied - x.get(0, i)).abs() < 1e-5,
                "weight ({i},{j}) moved by {applied}, expected {}",
                x.get(0, i)
            );
        }
    }
}

#[test]
fn lstm_forward_keeps_batch_and_hidden_shapes() {
    let lstm = Lstm::new(3, 5);
    let xs: Vec<Matrix> = (0..4)
        .map(|t| Matrix::from_vec(2, 3, vec![0.1 * t as f32; 6]))
        .collect();
    let hs = lstm.forward(&xs);
    assert_eq!(hs.len(), 4);
    for h in &hs {
        assert_eq!(h.rows, 2);
        assert_eq!(h.cols, 5);
        for v in &h.data {
            assert!(v.is_finite());
        }
    }
}

#[test]
fn lstm_step_state_replays_the_sequence_forward() {
    let lstm = Lstm::new(2, 4);
    let xs: Vec<Matrix> = vec![
        Matrix::from_vec(1, 2, vec![0.3, -0.2]),
        Matrix::from_vec(1, 2, vec![-0.1, 0.8]),
        Matrix::from_vec(1, 2, vec![0.5, 0.5]),
    ];
    let hs = lstm.forward(&xs);

    let mut h = Matrix::zeros(1, 4);
    let mut c = Matrix::zeros(1, 4);
    for (x_t, expect) in xs.iter().zip(hs.iter()) {
        let (h_new, c_new) = lstm.step_state(x_t, &h, &c);
        h = h_new;
        c = c_new;
        assert_eq!(&h, expect);
    }
}

#[test]
fn lstm_backward_reaches_every_gate_weight() {
    let mut lstm = Lstm::new(3, 4);
    let xs: Vec<Matrix> = (0..3)
        .map(|t| Matrix::from_vec(2, 3, vec![0.2 + 0.1 * t as f32; 6]))
        .collect();
    let hs = lstm.forward_train(&xs);
    let grad_h: Vec<Matrix> = hs
        .iter()
        .map(|h| Matrix::from_vec(h.rows, h.cols, vec![1.0; h.data.len()]))
        .collect();
    let grad_x = lstm.backward(&grad_h);
    assert_eq!(grad_x.len(), 3);
    for p in lstm.parameters() {
        assert!(p.grad_norm_sq() > 0.0, "a gate weight received no gradient");
    }
}

#[test]
fn zero_grad_clears_accumulated_gradients() {
    let mut lstm = Lstm::new(2, 3);
    let xs = vec![Matrix::from_vec(1, 2, vec![1.0, -1.0])];
    let hs = lstm.forward_train(&xs);
    let grad_h = vec![Matrix::from_vec(1, 3, vec![1.0; 3]); hs.len()];
    lstm.backward(&grad_h);
    lstm.zero_grad();
    for p in lstm.parameters() {
        assert_eq!(p.grad_norm_sq(), 0.0);
    }
}
