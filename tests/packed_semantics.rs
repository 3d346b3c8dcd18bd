use packed_rnn::{
    Activation, Direction, FrameLayout, InputMode, PackedBatchProfile, ParamKind, RnnBuilder,
    TimeOrder,
};

fn relu_bidirectional_unit() -> packed_rnn::Rnn {
    RnnBuilder::new(1, 1)
        .unwrap()
        .direction(Direction::Bidirectional)
        .bias(false)
        .activation(Activation::ReLU)
        .build()
        .unwrap()
}

#[test]
fn reverse_direction_reads_initial_state_where_sequences_start() {
    // Lengths 3, 2, 2: in reverse time rows 1 and 2 begin at t = 1, not t = 2.
    let rnn = relu_bidirectional_unit();
    let profile = PackedBatchProfile::new(vec![3, 3, 1]).unwrap();
    let params = [1.0, 1.0, 1.0, 1.0];
    let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let hx = [10.0, 20.0, 30.0, 100.0, 200.0, 300.0];

    let fwd = rnn
        .forward_train(&profile, &input, Some(&hx), &params)
        .unwrap();
    assert_eq!(
        fwd.output,
        vec![
            11.0, 112.0, //
            22.0, 207.0, //
            33.0, 309.0, //
            15.0, 111.0, //
            27.0, 205.0, //
            39.0, 306.0, //
            22.0, 107.0,
        ]
    );
    assert_eq!(fwd.final_hidden, vec![22.0, 27.0, 39.0, 112.0, 207.0, 309.0]);

    // Control: zeroing the reverse-direction initial rows 1..3 changes exactly
    // the reverse column of those rows from t = 1 back to t = 0.
    let control_hx = [10.0, 20.0, 30.0, 100.0, 0.0, 0.0];
    let control = rnn
        .forward_train(&profile, &input, Some(&control_hx), &params)
        .unwrap();
    for frame in 0..profile.total_frames() {
        let changed = [1, 2, 4, 5].contains(&frame);
        assert_eq!(control.output[2 * frame], fwd.output[2 * frame]);
        assert_eq!(
            control.output[2 * frame + 1] != fwd.output[2 * frame + 1],
            changed,
            "frame {frame}"
        );
    }

    let dy = vec![1.0; rnn.output_len(&profile)];
    let dhy = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
    let bwd = rnn
        .backward_data(&profile, &dy, Some(&dhy), &params, &fwd.reserve)
        .unwrap();
    assert_eq!(bwd.initial_hidden_grad, vec![3.0, 2.0, 2.0, 4.0, 3.0, 3.0]);
    assert_eq!(bwd.input_grad, vec![5.0, 4.0, 4.0, 5.0, 4.0, 4.0, 5.0]);
}

#[test]
fn absent_initial_state_matches_zero_state() {
    let rnn = RnnBuilder::new(3, 4)
        .unwrap()
        .num_layers(2)
        .unwrap()
        .direction(Direction::Bidirectional)
        .build()
        .unwrap();
    let profile = PackedBatchProfile::new(vec![4, 3, 3, 1]).unwrap();
    let params = rnn.init_params_with_seed(5);
    let input: Vec<f32> = (0..rnn.input_len(&profile))
        .map(|v| (v as f32 * 0.21).sin())
        .collect();
    let zeros = vec![0.0; rnn.hidden_len(&profile)];

    let absent = rnn.forward_train(&profile, &input, None, &params).unwrap();
    let zero = rnn
        .forward_train(&profile, &input, Some(&zeros), &params)
        .unwrap();
    assert_eq!(absent, zero);

    let dy: Vec<f32> = (0..rnn.output_len(&profile))
        .map(|v| (v as f32 * 0.13).cos())
        .collect();
    let no_dhy = rnn
        .backward_data(&profile, &dy, None, &params, &absent.reserve)
        .unwrap();
    let zero_dhy = rnn
        .backward_data(&profile, &dy, Some(&zeros), &params, &absent.reserve)
        .unwrap();
    assert_eq!(no_dhy, zero_dhy);

    let dw_absent = rnn
        .backward_weights(&profile, &input, None, &absent.reserve, &no_dhy.workspace)
        .unwrap();
    let dw_zero = rnn
        .backward_weights(&profile, &input, Some(&zeros), &absent.reserve, &no_dhy.workspace)
        .unwrap();
    assert_eq!(dw_absent, dw_zero);
}

#[test]
fn passes_are_idempotent_over_dirty_buffers() {
    let rnn = RnnBuilder::new(2, 3)
        .unwrap()
        .num_layers(2)
        .unwrap()
        .direction(Direction::Bidirectional)
        .build()
        .unwrap();
    let profile = PackedBatchProfile::new(vec![3, 2, 1]).unwrap();
    let params = rnn.init_params_with_seed(2);
    let input = vec![0.3; rnn.input_len(&profile)];
    let hx = vec![-0.2; rnn.hidden_len(&profile)];
    let dy = vec![0.7; rnn.output_len(&profile)];

    let mut output = vec![f32::NAN; rnn.output_len(&profile)];
    let mut hy = vec![f32::NAN; rnn.hidden_len(&profile)];
    let mut reserve = vec![f32::NAN; rnn.reserve_len(&profile)];
    let mut dx = vec![f32::NAN; rnn.input_len(&profile)];
    let mut dhx = vec![f32::NAN; rnn.hidden_len(&profile)];
    let mut ws = vec![f32::NAN; rnn.workspace_len(&profile)];
    let mut dw = vec![f32::NAN; rnn.param_len()];

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        rnn.forward_train_into(
            &profile,
            &input,
            Some(&hx),
            &params,
            &mut output,
            Some(&mut hy),
            &mut reserve,
        )
        .unwrap();
        rnn.backward_data_into(
            &profile,
            &dy,
            None,
            &params,
            &reserve,
            &mut dx,
            Some(&mut dhx),
            &mut ws,
        )
        .unwrap();
        rnn.backward_weights_into(&profile, &input, Some(&hx), &reserve, &ws, &mut dw)
            .unwrap();
        snapshots.push((output.clone(), hy.clone(), dx.clone(), dhx.clone(), dw.clone()));
    }
    assert_eq!(snapshots[0], snapshots[1]);

    let fresh = rnn
        .forward_train(&profile, &input, Some(&hx), &params)
        .unwrap();
    assert_eq!(fresh.output, output);
    assert_eq!(fresh.reserve, reserve);
}

#[test]
fn every_parameter_receives_a_gradient() {
    let rnn = RnnBuilder::new(2, 3)
        .unwrap()
        .num_layers(2)
        .unwrap()
        .direction(Direction::Bidirectional)
        .build()
        .unwrap();
    let profile = PackedBatchProfile::new(vec![3, 3, 2]).unwrap();
    let params = rnn.init_params_with_seed(4);
    let input: Vec<f32> = (0..rnn.input_len(&profile))
        .map(|v| 0.5 + (v as f32 * 0.7).sin())
        .collect();
    let hx = vec![0.4; rnn.hidden_len(&profile)];
    let dy = vec![1.0; rnn.output_len(&profile)];

    let fwd = rnn
        .forward_train(&profile, &input, Some(&hx), &params)
        .unwrap();
    let bwd = rnn
        .backward_data(&profile, &dy, None, &params, &fwd.reserve)
        .unwrap();
    let dw = rnn
        .backward_weights(&profile, &input, Some(&hx), &fwd.reserve, &bwd.workspace)
        .unwrap();

    let layout = rnn.layout();
    let mut seen = vec![false; rnn.param_len()];
    for layer in 0..2 {
        for dir in 0..2 {
            for kind in [
                ParamKind::InputWeight,
                ParamKind::RecurrentWeight,
                ParamKind::InputBias,
                ParamKind::RecurrentBias,
            ] {
                let range = layout.range(layer, dir, kind).unwrap();
                for i in range {
                    assert!(!seen[i], "parameter {i} owned twice");
                    seen[i] = true;
                    assert!(dw[i] != 0.0, "{kind:?} l{layer} d{dir} index {i} has no gradient");
                }
            }
        }
    }
    assert!(seen.into_iter().all(|s| s));
}

#[test]
fn skip_input_adds_raw_input() {
    let rnn = RnnBuilder::new(1, 1)
        .unwrap()
        .input_mode(InputMode::Skip)
        .activation(Activation::ReLU)
        .build()
        .unwrap();
    assert_eq!(rnn.param_len(), 3);

    let profile = PackedBatchProfile::uniform(1, 2).unwrap();
    // [w_rec, b_in, b_rec]
    let params = [0.5, 0.25, 0.25];
    let fwd = rnn
        .forward_train(&profile, &[1.0, 2.0], None, &params)
        .unwrap();
    // t0: 1 + 0.5 = 1.5; t1: 2 + 0.75 + 0.5 = 3.25
    assert_eq!(fwd.output, vec![1.5, 3.25]);

    let bwd = rnn
        .backward_data(&profile, &[0.0, 1.0], None, &params, &fwd.reserve)
        .unwrap();
    // dz1 = 1, dz0 = 0.5; the input gradient is the pre-activation gradient.
    assert_eq!(bwd.input_grad, vec![0.5, 1.0]);
}

#[test]
fn every_frame_is_visited_once_per_layer_and_direction() {
    let config = RnnBuilder::new(2, 3)
        .unwrap()
        .num_layers(2)
        .unwrap()
        .direction(Direction::Bidirectional)
        .build_config()
        .unwrap();
    for batch_at in [vec![1], vec![4, 4, 4], vec![5, 3, 3, 2, 1], vec![3, 3, 1]] {
        let profile = PackedBatchProfile::new(batch_at.clone()).unwrap();
        assert_eq!(profile.total_frames(), batch_at.iter().sum::<usize>());

        let frames = FrameLayout::new(&config, &profile);
        let mut hits = vec![0_u32; frames.region_len()];
        for layer in 0..config.num_layers {
            for dir in 0..config.num_directions() {
                let order = TimeOrder::of_direction(dir);
                let mut started = vec![0_u32; profile.max_batch()];
                let mut ended = vec![0_u32; profile.max_batch()];
                let mut alive = 0;
                for t in profile.steps(order) {
                    let view = frames.frames(layer, dir, profile.frame_range(t));
                    for r in 0..view.rows {
                        for c in 0..view.cols {
                            hits[view.offset + r * view.ld + c] += 1;
                        }
                    }

                    // Every row is either carried from the previous step or
                    // starts here from the initial state.
                    let carried = profile.carried_rows(t, order);
                    assert!(carried <= alive, "{batch_at:?} t{t}");
                    let starting = profile.starting_rows(t, order);
                    assert_eq!(starting.start, carried);
                    assert_eq!(starting.end, view.rows);
                    assert_eq!(carried > 0, profile.prev_step(t, order).is_some());
                    for r in starting {
                        started[r] += 1;
                    }
                    for r in profile.ending_rows(t, order) {
                        ended[r] += 1;
                    }
                    alive = view.rows;
                }
                assert!(started.iter().all(|&s| s == 1), "{batch_at:?} dir {dir}");
                assert!(ended.iter().all(|&e| e == 1), "{batch_at:?} dir {dir}");
            }
        }
        assert!(hits.iter().all(|&h| h == 1), "{batch_at:?}");
    }
}
