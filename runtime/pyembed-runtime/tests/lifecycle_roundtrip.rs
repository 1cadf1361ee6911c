mod common;

use pyembed_runtime::state::gil_depth;
use pyembed_runtime::text::WideString;
use pyembed_runtime::{EmbedError, Runtime, RuntimePhase, StartToken, TypeCategory};

/// Enters `levels` nested lock scopes, recording the depth seen in each.
fn nest(runtime: &Runtime, levels: usize, depths: &mut Vec<usize>) {
    if levels == 0 {
        return;
    }
    runtime
        .with_gil(|_py| {
            assert!(runtime.gil_held());
            depths.push(gil_depth());
            nest(runtime, levels - 1, depths);
        })
        .expect("ensure");
}

#[test]
fn initialize_use_and_finalize() {
    let Some((runtime, settings)) = common::load_or_skip("lifecycle_roundtrip") else {
        return;
    };
    assert_eq!(runtime.phase(), RuntimePhase::LibraryLoaded);
    assert!(runtime.version().starts_with("3.12."));

    common::pre_init(&runtime);
    assert_eq!(runtime.phase(), RuntimePhase::PreInitialized);
    let wide = WideString::decode(runtime.symbols(), c"/srv/app/site-packages").unwrap();
    assert_eq!(wide.encode().unwrap(), "/srv/app/site-packages");
    drop(wide);
    assert!(matches!(
        runtime.pre_initialize(&Default::default()),
        Err(EmbedError::InvalidState(_))
    ));

    let config = settings.init_config().expect("discover home and paths");
    let main = runtime.initialize(&config).expect("initialize");
    assert_eq!(runtime.phase(), RuntimePhase::Initialized);
    assert!(main.interpreter().is_main());
    assert_eq!(runtime.live_thread_states(), 1);
    assert!(runtime.gil_held());

    // Recursive ensure/release while the main thread state already holds the lock.
    let mut depths = Vec::new();
    nest(&runtime, 5, &mut depths);
    assert_eq!(depths, vec![1, 2, 3, 4, 5]);
    assert_eq!(gil_depth(), 0);
    assert!(runtime.gil_held());

    // Save/restore hands back the very same thread state.
    let before = main.as_ptr();
    let saved = main.save();
    assert_eq!(saved.as_ptr(), before);
    let from_ensure = runtime
        .with_gil(|py| py.int(7).and_then(|n| n.extract_i64()))
        .expect("ensure while saved");
    assert_eq!(from_ensure.expect("int round trip"), 7);
    // Nested ensures from a thread that holds nothing hand the lock back
    // once the outermost one ends.
    assert!(!runtime.gil_held());
    let mut depths = Vec::new();
    nest(&runtime, 4, &mut depths);
    assert_eq!(depths, vec![1, 2, 3, 4]);
    assert_eq!(gil_depth(), 0);
    assert!(!runtime.gil_held());
    let main = saved.restore();
    assert_eq!(main.as_ptr(), before);

    {
        let py = main.token();
        let samples = [
            (py.int(42).unwrap(), TypeCategory::Integer),
            (py.new_list().unwrap(), TypeCategory::List),
            (py.new_tuple(vec![py.int(1).unwrap()]).unwrap(), TypeCategory::Tuple),
            (py.bytes(b"raw").unwrap(), TypeCategory::Bytes),
            (py.str("text").unwrap(), TypeCategory::Text),
            (py.new_dict().unwrap(), TypeCategory::Mapping),
            (py.float(1.5).unwrap(), TypeCategory::Float),
            (py.none().unwrap(), TypeCategory::None),
        ];
        for (obj, want) in &samples {
            assert_eq!(obj.classify(), *want);
            assert_eq!(obj.classify(), obj.classify());
        }
        assert_eq!(py.classify(std::ptr::null_mut()), TypeCategory::Unknown);

        let globals = py.new_globals().unwrap();
        let evaluated = [
            ("{1, 2}", TypeCategory::Set),
            ("frozenset()", TypeCategory::Set),
            ("len", TypeCategory::Callable),
            ("lambda: 0", TypeCategory::Callable),
            ("(1).__add__", TypeCategory::Callable),
            ("(i for i in range(3))", TypeCategory::Iterator),
            ("iter([])", TypeCategory::Iterator),
            ("map(str, [])", TypeCategory::Iterator),
            ("zip()", TypeCategory::Iterator),
            ("enumerate([])", TypeCategory::Iterator),
            ("bytearray(b'x')", TypeCategory::Unknown),
            ("object()", TypeCategory::Unknown),
        ];
        for (expr, want) in evaluated {
            let obj = py.eval(expr, &globals).unwrap();
            assert_eq!(obj.classify(), want, "{expr}");
            assert_eq!(obj.classify(), obj.classify(), "{expr}");
        }
        let sys = py.import("sys").unwrap();
        assert_eq!(sys.classify(), TypeCategory::Module);
        assert_eq!(py.new_module("scratch").unwrap().classify(), TypeCategory::Module);

        py.run("x = 40 + 2", StartToken::File, &globals, None)
            .unwrap();
        assert_eq!(globals.get("x").unwrap().unwrap().to_owned().extract_i64().unwrap(), 42);
        let sum = py.eval("x * 2", &globals).unwrap();
        assert_eq!(sum.extract_i64().unwrap(), 84);

        match py.eval("1 / 0", &globals) {
            Err(EmbedError::Python { kind, .. }) => assert_eq!(kind, "ZeroDivisionError"),
            other => panic!("expected ZeroDivisionError, got {other:?}"),
        }
        assert!(py.eval("1", &globals).is_ok());
    }

    main.finalize().expect("finalize");
    assert_eq!(runtime.phase(), RuntimePhase::Finalized);
    assert_eq!(runtime.live_thread_states(), 0);
    assert!(!runtime.gil_held());
}
