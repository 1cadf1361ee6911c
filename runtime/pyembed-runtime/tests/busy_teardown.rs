mod common;

use std::sync::mpsc;
use std::thread;

use pyembed_runtime::{
    EmbedError, InterpreterRef, PyToken, RuntimePhase, StartToken, SubInterpreterConfig,
};

/// Attaches a worker to `interp` on a new thread and parks it saved until the
/// returned sender fires. Call with `interp`'s lock released.
fn park_worker(interp: &InterpreterRef) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (go_tx, go_rx) = mpsc::channel::<()>();
    let interp = interp.clone();
    let handle = thread::Builder::new()
        .name("parked-worker".into())
        .spawn(move || {
            let saved = interp.attach().expect("attach worker").save();
            ready_tx.send(()).unwrap();
            go_rx.recv().unwrap();
            // Restores, then clears and deletes the worker.
            drop(saved);
        })
        .unwrap();
    ready_rx.recv().expect("worker parked");
    (go_tx, handle)
}

fn has_marker(py: PyToken<'_>) -> bool {
    let globals = py.new_globals().unwrap();
    py.eval("hasattr(__import__('sys'), 'embed_marker')", &globals)
        .and_then(|flag| flag.extract_i64())
        .unwrap()
        == 1
}

#[test]
fn refused_teardown_keeps_handles_usable() {
    let Some((runtime, settings)) = common::load_or_skip("busy_teardown") else {
        return;
    };
    common::pre_init(&runtime);
    let config = settings.init_config().expect("discover home and paths");
    let mut main = runtime.initialize(&config).expect("initialize");

    // Finalize with a worker still attached to main.
    let main_interp = main.interpreter().clone();
    let (go, worker) = main.allow_threads(|| park_worker(&main_interp));
    let refused = main.finalize().expect_err("worker still attached");
    assert!(matches!(refused.error(), EmbedError::InvalidState(_)));
    let mut main = refused.into_inner();
    assert_eq!(runtime.phase(), RuntimePhase::Initialized);
    assert!(!has_marker(main.token()));
    go.send(()).unwrap();
    main.allow_threads(|| worker.join()).expect("worker panicked");
    assert_eq!(runtime.live_thread_states(), 1);

    // End a sub-interpreter with a worker still attached.
    {
        let mut sub = main
            .new_sub_interpreter(&SubInterpreterConfig::shared())
            .expect("create sub-interpreter");
        let interp = sub.interpreter().clone();
        let (go, worker) = sub
            .allow_threads(|| park_worker(&interp))
            .expect("sub-interpreter alive");
        let refused = sub.end().expect_err("worker still attached");
        assert!(matches!(refused.error(), EmbedError::InvalidState(_)));
        let mut sub = refused.into_inner();
        assert_eq!(runtime.live_sub_interpreters(), 1);

        // The sub-interpreter is still the one running on this thread.
        let py = sub.token().expect("sub-interpreter alive");
        let globals = py.new_globals().unwrap();
        py.run("import sys\nsys.embed_marker = 1", StartToken::File, &globals, None)
            .unwrap();
        assert!(has_marker(py));
        drop(globals);

        go.send(()).unwrap();
        sub.allow_threads(|| worker.join())
            .expect("sub-interpreter alive")
            .expect("worker panicked");
        sub.end().expect("end once idle");
    }
    assert_eq!(runtime.live_sub_interpreters(), 0);
    // Back in main, whose sys never saw the marker.
    assert!(!has_marker(main.token()));

    // Dropping a sub-interpreter waits for its workers before ending it.
    {
        let mut sub = main
            .new_sub_interpreter(&SubInterpreterConfig::shared())
            .expect("create sub-interpreter");
        let interp = sub.interpreter().clone();
        let (go, worker) = sub
            .allow_threads(|| park_worker(&interp))
            .expect("sub-interpreter alive");
        assert_eq!(runtime.locks().workers_of(interp.id()), 1);
        go.send(()).unwrap();
        drop(sub);
        assert_eq!(runtime.locks().workers_of(interp.id()), 0);
        assert_eq!(runtime.live_sub_interpreters(), 0);
        worker.join().expect("worker panicked");
    }
    assert!(!has_marker(main.token()));
    assert_eq!(runtime.live_thread_states(), 1);

    main.finalize().expect("finalize");
    assert_eq!(runtime.phase(), RuntimePhase::Finalized);
    assert_eq!(runtime.live_thread_states(), 0);
}
