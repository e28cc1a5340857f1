//! End-to-end tests of the execution wrapper: schema in, host call, result out.

use nodefunc::prelude::*;
use nodefunc::{FailureReport, FileModule, HostType, LocalHost, NodeFn, ReturnSlot, node_fn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

fn kwargs<const N: usize>(pairs: [(&str, Value); N]) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn registry_with(config: RuntimeConfig) -> NodeRegistry {
    NodeRegistry::new(Runtime::new(config))
}

#[test]
fn test_mask_node_round_trip() {
    let registry = registry_with(RuntimeConfig::default());
    let invert = node_function!(
        invert_mask,
        Signature::new().input::<MaskTensor>("mask").returns::<MaskTensor>(),
        |args: &mut Args| {
            let mask: Tensor = args.get("mask")?;
            let data = mask.data().iter().map(|v| 1.0 - *v).collect();
            Ok(Value::Tensor(Tensor::new(mask.shape().to_vec(), data)?))
        }
    );
    let node = registry.define(invert).register().unwrap();

    // 2-D masks gain a leading batch axis before the call.
    let mask = Tensor::filled(vec![4, 4], 0.25);
    let output = node.invoke(kwargs([("mask", Value::Tensor(mask))])).unwrap();
    let result = output.result[0].as_tensor().unwrap();
    assert_eq!(result.shape(), &[1, 4, 4]);
    assert_eq!(result.max(), Some(0.75));
    assert!(result.device().is_cpu());
    assert!(output.ui.is_none());
}

#[test]
fn test_mask_out_of_range_is_rejected() {
    let registry = registry_with(RuntimeConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let f = NodeFunction::new(
        "use_mask",
        Signature::new().input::<MaskTensor>("mask").returns::<MaskTensor>(),
        move |args: &mut Args| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(args.get::<Value>("mask")?)
        },
    );
    let node = registry.define(f).register().unwrap();

    let err = node
        .invoke(kwargs([("mask", Value::Tensor(Tensor::filled(vec![1, 2, 2], 1.5)))]))
        .unwrap_err();
    assert!(matches!(err, NodeError::InputValidation { ref param, .. } if param == "mask"));
    assert!(err.to_string().contains("between 0 and 1"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mask_with_nan_is_rejected() {
    let registry = registry_with(RuntimeConfig::default());
    let passthrough = NodeFunction::new(
        "use_mask",
        Signature::new().input::<MaskTensor>("mask").returns::<MaskTensor>(),
        |args: &mut Args| Ok(args.get::<Value>("mask")?),
    );
    let node = registry.define(passthrough).register().unwrap();
    let nan_mask = Tensor::new(vec![1, 2, 2], vec![0.5, f32::NAN, 0.5, 0.5]).unwrap();
    let err = node
        .invoke(kwargs([("mask", Value::Tensor(nan_mask.clone()))]))
        .unwrap_err();
    assert!(matches!(err, NodeError::InputValidation { .. }));

    let producer = NodeFunction::new("make_mask", Signature::new().returns::<MaskTensor>(), move |_: &mut Args| {
        Ok(Value::Tensor(nan_mask.clone()))
    });
    let node = registry.define(producer).register().unwrap();
    assert!(matches!(
        node.invoke(HashMap::new()),
        Err(NodeError::OutputValidation { .. })
    ));
}

#[test]
fn test_verification_can_be_disabled() {
    let registry = registry_with(RuntimeConfig::default().with_verify_tensors(false));
    let f = NodeFunction::new(
        "use_mask",
        Signature::new().input::<MaskTensor>("mask").returns::<MaskTensor>(),
        |args: &mut Args| Ok(args.get::<Value>("mask")?),
    );
    let node = registry.define(f).register().unwrap();
    assert!(node
        .invoke(kwargs([("mask", Value::Tensor(Tensor::filled(vec![1, 2, 2], 1.5)))]))
        .is_ok());
}

#[test]
fn test_output_verification_names_the_output() {
    let registry = registry_with(RuntimeConfig::default());
    let f = NodeFunction::new(
        "bad_image",
        Signature::new().returns::<ImageTensor>(),
        |_: &mut Args| Ok(Value::Tensor(Tensor::zeros(vec![4, 4, 3]))),
    );
    let node = registry.define(f).return_names(["picture"]).register().unwrap();
    let err = node.invoke(HashMap::new()).unwrap_err();
    match err {
        NodeError::OutputValidation { output, .. } => assert_eq!(output, "'picture'"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_return_arity() {
    let registry = registry_with(RuntimeConfig::default());
    let f = NodeFunction::new(
        "pair",
        Signature::new().returns_tuple([Annotation::of::<i64>(), Annotation::of::<String>()]),
        |_: &mut Args| Ok(Value::Tuple(vec![Value::Int(1)])),
    );
    let node = registry.define(f).register().unwrap();
    let err = node.invoke(HashMap::new()).unwrap_err();
    assert!(matches!(err, NodeError::ReturnArity { expected: 2, got: 1, .. }));

    let ok = NodeFunction::new(
        "pair_ok",
        Signature::new().returns_tuple([Annotation::of::<i64>(), Annotation::of::<String>()]),
        |_: &mut Args| Ok(Value::Tuple(vec![Value::Int(1), Value::from("a")])),
    );
    let node = registry.define(ok).register().unwrap();
    assert_eq!(node.invoke(HashMap::new()).unwrap().result.len(), 2);
}

#[test]
fn test_node_without_outputs() {
    let registry = registry_with(RuntimeConfig::default());
    let quiet = NodeFunction::new("log_value", Signature::new().input::<i64>("x"), |_: &mut Args| {
        Ok(Value::None)
    });
    let node = registry.define(quiet).register().unwrap();
    assert!(node.descriptor().output_node);
    assert_eq!(node.invoke(kwargs([("x", Value::Int(1))])).unwrap().result, vec![Value::None]);

    let noisy = NodeFunction::new("noisy", Signature::new(), |_: &mut Args| Ok(Value::Int(1)));
    let node = registry.define(noisy).register().unwrap();
    assert!(matches!(
        node.invoke(HashMap::new()),
        Err(NodeError::UnexpectedReturn { .. })
    ));
}

#[test]
fn test_list_mode_unwraps_scalars() {
    let registry = registry_with(RuntimeConfig::default());
    let f = NodeFunction::new(
        "sum_scaled",
        Signature::new()
            .list_input::<i64>("values")
            .input::<i64>("scale")
            .returns::<i64>(),
        |args: &mut Args| {
            let values: Vec<i64> = args.get("values")?;
            let scale: i64 = args.get("scale")?;
            Ok(Value::Int(values.iter().sum::<i64>() * scale))
        },
    );
    let node = registry.define(f).register().unwrap();
    assert!(node.descriptor().input_is_list);

    let ints = |xs: &[i64]| Value::List(xs.iter().map(|&x| Value::Int(x)).collect());
    let output = node
        .invoke(kwargs([("values", ints(&[1, 2, 3])), ("scale", ints(&[10]))]))
        .unwrap();
    assert_eq!(output.result, vec![Value::Int(60)]);

    let err = node
        .invoke(kwargs([("values", ints(&[1])), ("scale", ints(&[1, 2]))]))
        .unwrap_err();
    assert!(matches!(err, NodeError::ListArity { len: 2, .. }));
}

#[test]
fn test_missing_and_unexpected_arguments() {
    let registry = registry_with(RuntimeConfig::default());
    let f = NodeFunction::new(
        "add",
        Signature::new().input::<i64>("a").input_with::<i64>("b", 5).returns::<i64>(),
        |args: &mut Args| Ok(Value::Int(args.get::<i64>("a")? + args.get::<i64>("b")?)),
    );
    let node = registry.define(f).register().unwrap();

    // Absent optional parameters take their defaults.
    assert_eq!(node.invoke(kwargs([("a", Value::Int(1))])).unwrap().result, vec![Value::Int(6)]);
    assert!(matches!(
        node.invoke(kwargs([("b", Value::Int(1))])),
        Err(NodeError::MissingArgument { .. })
    ));
    assert!(matches!(
        node.invoke(kwargs([("a", Value::Int(1)), ("c", Value::Int(1))])),
        Err(NodeError::UnexpectedArgument { .. })
    ));
}

#[test]
fn test_retries_call_hook_between_attempts() {
    let reports: Arc<Mutex<Vec<(u32, String, String)>>> = Arc::default();
    let inputs: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&reports);
    let input_sink = Arc::clone(&inputs);
    let config = RuntimeConfig::default()
        .with_max_tries(3)
        .with_exception_hook(move |report: &FailureReport<'_>| {
            sink.lock().unwrap().push((
                report.attempt,
                report.error.to_string(),
                report.log.to_string(),
            ));
            *input_sink.lock().unwrap() = report.inputs.to_vec();
        });
    let registry = registry_with(config);

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = NodeFunction::new(
        "flaky",
        Signature::new().input::<i64>("x").returns::<i64>(),
        move |args: &mut Args| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            args.diagnostics().write_line(format!("attempt {n}"));
            Err(format!("failure {n}").into())
        },
    );
    let node = registry.define(flaky).register().unwrap();

    let err = node.invoke(kwargs([("x", Value::Int(1))])).unwrap_err();
    assert_eq!(err.to_string(), "failure 3");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0], (1, "failure 1".to_string(), "attempt 1\n".to_string()));
    assert_eq!(reports[1].0, 2);
    assert_eq!(*inputs.lock().unwrap(), vec!["x (int): 1".to_string()]);
}

#[test]
fn test_retry_recovers() {
    let registry = registry_with(RuntimeConfig::default().with_max_tries(2));
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let f = NodeFunction::new("second_time", Signature::new().returns::<i64>(), move |_: &mut Args| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("not yet".into())
        } else {
            Ok(Value::Int(2))
        }
    });
    let node = registry.define(f).register().unwrap();
    assert_eq!(node.invoke(HashMap::new()).unwrap().result, vec![Value::Int(2)]);
}

#[test]
fn test_hook_fires_once_per_failed_attempt() {
    let hooks = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&hooks);
    let config = RuntimeConfig::default()
        .with_max_tries(4)
        .with_exception_hook(move |_: &FailureReport<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let registry = registry_with(config);

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let f = NodeFunction::new("third_time", Signature::new().returns::<i64>(), move |_: &mut Args| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err("not yet".into())
        } else {
            Ok(Value::Int(9))
        }
    });
    let node = registry.define(f).register().unwrap();
    assert_eq!(node.invoke(HashMap::new()).unwrap().result, vec![Value::Int(9)]);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(hooks.load(Ordering::SeqCst), 2);
}

struct Celsius;

impl HostType for Celsius {
    fn host_tag() -> HostTag {
        HostTag::new("CELSIUS")
    }

    fn convert(value: Value) -> Result<Value, NodeError> {
        match value {
            Value::Int(i) => Ok(Value::Float(i as f64)),
            other => Ok(other),
        }
    }
}

#[test]
fn test_autoconvert_registered_types() {
    let runtime = Runtime::new(RuntimeConfig::default());
    runtime
        .types()
        .register::<Celsius>(TypeOptions::default().autoconvert());
    let registry = NodeRegistry::new(Arc::clone(&runtime));
    let f = NodeFunction::new(
        "warm",
        Signature::new().input::<Celsius>("t").returns::<Celsius>(),
        |args: &mut Args| match args.value("t") {
            Some(Value::Float(t)) => Ok(Value::Float(t + 1.0)),
            other => Err(format!("expected a float, got {other:?}").into()),
        },
    );
    let node = registry.define(f).register().unwrap();
    assert_eq!(node.descriptor().return_types, vec![HostTag::new("CELSIUS")]);
    assert_eq!(
        node.invoke(kwargs([("t", Value::Int(20))])).unwrap().result,
        vec![Value::Float(21.0)]
    );
}

#[test]
fn test_text_and_image_previews() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::with_host(RuntimeConfig::default(), Arc::new(LocalHost::new(dir.path())));
    let registry = NodeRegistry::new(runtime);

    let text = NodeFunction::new("describe", Signature::new().returns::<String>(), |_: &mut Args| {
        Ok(Value::from("a cat"))
    });
    let node = registry.define(text).preview().register().unwrap();
    let output = node.invoke(HashMap::new()).unwrap();
    assert_eq!(
        output.ui_json().unwrap(),
        serde_json::json!({"ui": {"text": ["a cat"]}})
    );

    let image = NodeFunction::new("render", Signature::new().returns::<ImageTensor>(), |_: &mut Args| {
        Ok(Value::Tensor(Tensor::filled(vec![1, 2, 2, 3], 1.0)))
    });
    let node = registry.define(image).preview().register().unwrap();
    let ui = node.invoke(HashMap::new()).unwrap().ui_json().unwrap();
    let filename = ui["ui"]["images"][0]["filename"].as_str().unwrap().to_string();
    assert_eq!(ui["ui"]["images"][0]["type"], "temp");
    assert!(dir.path().join(filename).exists());
}

#[test]
fn test_unrenderable_preview_keeps_result() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::with_host(RuntimeConfig::default(), Arc::new(LocalHost::new(dir.path())));
    let registry = NodeRegistry::new(runtime);

    let f = NodeFunction::new("histogram", Signature::new().returns::<Tensor>(), |_: &mut Args| {
        Ok(Value::Tensor(Tensor::filled(vec![2, 8], 0.5)))
    });
    let node = registry.define(f).preview().register().unwrap();
    let output = node.invoke(HashMap::new()).unwrap();
    assert!(output.ui.is_none());
    assert_eq!(output.result[0].as_tensor().unwrap().shape(), &[2, 8]);
}

#[test]
fn test_explicit_return_slots() {
    let registry = registry_with(RuntimeConfig::default());
    let f = NodeFunction::new("anything", Signature::new(), |_: &mut Args| {
        Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
    });
    let node = registry
        .define(f)
        .return_types([ReturnSlot::list(HostTag::INT)])
        .register()
        .unwrap();
    assert_eq!(node.descriptor().output_is_list, vec![true]);
    assert!(!node.descriptor().output_node);
    assert_eq!(
        node.invoke(HashMap::new()).unwrap().result,
        vec![Value::List(vec![Value::Int(1), Value::Int(2)])]
    );
}

#[test]
fn test_hot_reloaded_implementation() {
    fn loader(path: &std::path::Path) -> Result<HashMap<String, Arc<dyn NodeFn>>, BoxError> {
        let factor: i64 = std::fs::read_to_string(path)?.trim().parse()?;
        Ok(HashMap::from([(
            "scale".to_string(),
            node_fn(move |args: &mut Args| Ok(Value::Int(args.get::<i64>("x")? * factor))),
        )]))
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scale.txt");
    std::fs::write(&path, "2").unwrap();

    let runtime = Runtime::new(RuntimeConfig::default());
    let registry = NodeRegistry::new(Arc::clone(&runtime));
    let module = FileModule::load("scaling", &path, loader).unwrap();
    let function = module
        .bind("scale", Signature::new().input::<i64>("x").returns::<i64>())
        .unwrap();
    let node = registry.define(function).register().unwrap();
    assert_eq!(node.invoke(kwargs([("x", Value::Int(5))])).unwrap().result, vec![Value::Int(10)]);

    std::fs::write(&path, "3").unwrap();
    let later = runtime.reload().last_reload("scaling").unwrap() + std::time::Duration::from_secs(5);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();
    assert_eq!(node.invoke(kwargs([("x", Value::Int(5))])).unwrap().result, vec![Value::Int(15)]);

    runtime.update_config(|c| c.hot_reload = false);
    std::fs::write(&path, "4").unwrap();
    assert_eq!(node.invoke(kwargs([("x", Value::Int(5))])).unwrap().result, vec![Value::Int(10)]);
}
