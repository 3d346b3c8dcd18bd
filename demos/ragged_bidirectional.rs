use packed_rnn::{Direction, PackedBatchProfile, RnnBuilder};

fn main() -> packed_rnn::Result<()> {
    // Three sequences of lengths 4, 2 and 1, sorted longest first.
    let lengths = [4_usize, 2, 1];
    let batch_at: Vec<usize> = (0..lengths[0])
        .map(|t| lengths.iter().filter(|&&len| len > t).count())
        .collect();
    let profile = PackedBatchProfile::new(batch_at)?;
    println!("batch_at = {:?}", profile.batch_sizes());

    let rnn = RnnBuilder::new(2, 3)?
        .num_layers(2)?
        .direction(Direction::Bidirectional)
        .build()?;
    let params = rnn.init_params_with_seed(42);

    // Time-major packing: all frames of step 0, then step 1, ...
    let mut input = Vec::with_capacity(rnn.input_len(&profile));
    for t in 0..profile.seq_len() {
        for row in 0..profile.batch_at(t) {
            input.extend_from_slice(&[row as f32, t as f32 * 0.1]);
        }
    }

    let fwd = rnn.forward_train(&profile, &input, None, &params)?;
    let width = rnn.config().frame_width();
    for t in 0..profile.seq_len() {
        for (row, frame) in profile.frame_range(t).enumerate() {
            let y = &fwd.output[frame * width..][..width];
            println!("t={t} seq={row} y={y:?}");
        }
    }

    // Gradient of sum(y) with respect to everything.
    let dy = vec![1.0; rnn.output_len(&profile)];
    let bwd = rnn.backward_data(&profile, &dy, None, &params, &fwd.reserve)?;
    let dw = rnn.backward_weights(&profile, &input, None, &fwd.reserve, &bwd.workspace)?;

    let norm = dw.iter().map(|g| g * g).sum::<f32>().sqrt();
    println!("|dx| frames = {}", bwd.input_grad.len() / rnn.config().input_size);
    println!("|dW| = {norm:.6}");
    Ok(())
}
