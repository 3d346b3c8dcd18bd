#[cfg(not(feature = "serde"))]
fn main() {
    println!("enable the `serde` feature: cargo run --example save_load_json --features serde");
}

#[cfg(feature = "serde")]
fn main() -> packed_rnn::Result<()> {
    use packed_rnn::{Checkpoint, Direction, PackedBatchProfile, RnnBuilder};

    let rnn = RnnBuilder::new(3, 4)?
        .num_layers(2)?
        .direction(Direction::Bidirectional)
        .build()?;
    let params = rnn.init_params_with_seed(0);

    let path = "target/tmp_rnn.json";
    rnn.checkpoint(&params)?.save_json(path)?;

    let (loaded, loaded_params) = Checkpoint::load_json(path)?.into_parts()?;

    // Same network, same outputs.
    let profile = PackedBatchProfile::new(vec![2, 2, 1])?;
    let input = vec![0.5; rnn.input_len(&profile)];
    let a = rnn.forward_infer(&profile, &input, None, &params)?;
    let b = loaded.forward_infer(&profile, &input, None, &loaded_params)?;
    assert_eq!(a, b);

    println!("saved and loaded checkpoint: {path}");
    Ok(())
}
