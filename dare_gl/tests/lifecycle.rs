use std::sync::Arc;

use dare_gl::collector::ManualCollector;
use dare_gl::headless::{HeadlessDevice, HeadlessProbe, NativeCall};
use dare_gl::prelude::*;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tracked_context() -> anyhow::Result<(Context, HeadlessProbe, Arc<ManualCollector>)> {
    init_logging();
    let device = HeadlessDevice::new();
    let probe = device.probe();
    let collector = Arc::new(ManualCollector::new());
    let context = Context::builder()
        .collection_counter(collector.clone())
        .capture_creation_trace(true)
        .build(device)?;
    Ok((context, probe, collector))
}

#[test]
fn explicit_dispose_is_never_repeated_by_sweep() -> anyhow::Result<()> {
    let (context, probe, collector) = tracked_context()?;
    let mut texture = OwnedResource::allocate(&context, ResourceKind::Texture)?;
    let handle = texture.handle();

    texture.dispose()?;
    drop(texture);
    collector.collect();
    let report = context.run_sweep()?;

    assert!(report.swept);
    assert_eq!(report.leak_count(), 0);
    assert_eq!(probe.deletes_of(handle.raw()), 1);
    assert_eq!(probe.invalid_deletes(), 0);
    assert_eq!(context.tracked_count()?, 0);
    context.dispose()?;
    Ok(())
}

#[test]
fn sweep_without_collection_does_nothing() -> anyhow::Result<()> {
    let (context, probe, _collector) = tracked_context()?;
    for _ in 0..4 {
        drop(OwnedResource::allocate(&context, ResourceKind::Buffer)?);
    }
    let report = context.end_frame()?;
    assert!(!report.swept);
    assert_eq!(report.remaining, 4);
    assert_eq!(probe.delete_count(), 0);
    context.dispose()?;
    Ok(())
}

#[test]
fn every_leak_is_reclaimed_exactly_once() -> anyhow::Result<()> {
    let (context, probe, collector) = tracked_context()?;
    let leaked: Vec<_> = (0..8)
        .map(|i| {
            OwnedResource::new(&context, ResourceKind::Buffer)
                .with_label(format!("buffer {i}"))
                .create()
        })
        .collect::<Result<_, _>>()?;
    let kept = OwnedResource::allocate(&context, ResourceKind::Program)?;
    let handles: Vec<_> = leaked.iter().map(OwnedResource::handle).collect();
    drop(leaked);

    collector.collect();
    let report = context.run_sweep()?;
    assert_eq!(report.leak_count(), handles.len());
    assert!(report.failures.is_empty());
    assert_eq!(report.remaining, 1);
    for handle in &handles {
        assert_eq!(probe.deletes_of(handle.raw()), 1);
    }
    assert!(report
        .reclaimed
        .iter()
        .all(|leak| leak.label.is_some() && leak.creation_trace.is_some()));

    collector.collect();
    assert_eq!(context.run_sweep()?.leak_count(), 0);
    assert_eq!(probe.delete_count(), handles.len());

    drop(kept);
    context.dispose()?;
    Ok(())
}

#[test]
fn default_counter_sweeps_after_owner_drop() -> anyhow::Result<()> {
    init_logging();
    let device = HeadlessDevice::new();
    let probe = device.probe();
    let context = Context::new(device)?;
    let handle = {
        let resource = OwnedResource::allocate(&context, ResourceKind::Framebuffer)?;
        resource.handle()
    };
    let report = context.end_frame()?;
    assert!(report.swept);
    assert_eq!(report.leak_count(), 1);
    assert_eq!(probe.deletes_of(handle.raw()), 1);
    context.dispose()?;
    Ok(())
}

#[test]
fn reused_handle_is_rebound_after_delete() -> anyhow::Result<()> {
    let (context, probe, _collector) = tracked_context()?;
    let unit = TextureUnit(2);
    let mut first = OwnedResource::allocate(&context, ResourceKind::Texture)?;
    assert!(context.bind_texture_unit(unit, TextureTarget::Texture2D, first.checked_handle()?)?);
    assert!(!context.bind_texture_unit(unit, TextureTarget::Texture2D, first.checked_handle()?)?);
    let stale = first.handle();
    first.dispose()?;
    assert_eq!(context.state_cache()?.texture(unit), Some(NativeHandle::NULL));

    let mut second = OwnedResource::allocate(&context, ResourceKind::Texture)?;
    assert_eq!(second.handle(), stale);
    assert!(context.bind_texture(TextureTarget::Texture2D, second.checked_handle()?)?);
    assert_eq!(
        probe.count(|call| matches!(call, NativeCall::BindTexture(_, raw) if *raw == stale.raw())),
        2
    );

    second.dispose()?;
    context.dispose()?;
    Ok(())
}

#[test]
fn initialization_guards_reject_misuse() -> anyhow::Result<()> {
    let (context, _probe, _collector) = tracked_context()?;
    let mut resource = OwnedResource::new(&context, ResourceKind::Renderbuffer);
    assert!(matches!(
        resource.initialize(NativeHandle::NULL),
        Err(GlError::InvalidHandle)
    ));
    let handle = context.create_handle(ResourceKind::Renderbuffer)?;
    resource.initialize(handle)?;
    let err = resource.initialize(handle).unwrap_err();
    assert!(matches!(err, GlError::AlreadyInitialized));
    assert!(err.is_protocol_violation());
    resource.dispose()?;
    context.dispose()?;
    Ok(())
}

#[test]
fn children_disposed_after_context_teardown_make_no_native_calls() -> anyhow::Result<()> {
    let (context, probe, collector) = tracked_context()?;
    let mut children = vec![
        OwnedResource::allocate(&context, ResourceKind::Buffer)?,
        OwnedResource::allocate(&context, ResourceKind::Shader(ShaderStage::Fragment))?,
        OwnedResource::allocate(&context, ResourceKind::VertexArray)?,
    ];
    drop(OwnedResource::allocate(&context, ResourceKind::Texture)?);

    context.dispose()?;
    probe.clear_calls();
    collector.collect();

    for child in children.iter_mut() {
        child.dispose()?;
        assert!(child.is_disposed());
    }
    drop(children);
    assert!(matches!(context.run_sweep(), Err(GlError::ContextDisposed)));
    assert!(probe.calls().is_empty());
    Ok(())
}

#[test]
fn owner_dropped_on_another_thread_is_reclaimed_on_the_context_thread() -> anyhow::Result<()> {
    let (context, probe, collector) = tracked_context()?;
    let resource = OwnedResource::allocate(&context, ResourceKind::Buffer)?;
    let handle = resource.handle();

    std::thread::spawn(move || drop(resource))
        .join()
        .map_err(|_| anyhow::anyhow!("finalizer thread panicked"))?;
    assert_eq!(probe.delete_count(), 0);

    collector.collect();
    assert_eq!(context.run_sweep()?.leak_count(), 1);
    assert_eq!(probe.deletes_of(handle.raw()), 1);
    context.dispose()?;
    Ok(())
}

#[test]
fn dispose_from_wrong_thread_is_rejected() -> anyhow::Result<()> {
    let (context, probe, _collector) = tracked_context()?;
    let resource = OwnedResource::allocate(&context, ResourceKind::Buffer)?;

    let mut resource = std::thread::spawn(move || {
        let mut resource = resource;
        let result = resource.dispose();
        assert!(matches!(result, Err(GlError::WrongThread { .. })));
        assert_eq!(resource.state(), LifecycleState::Initialized);
        resource
    })
    .join()
    .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;

    assert_eq!(probe.delete_count(), 0);
    resource.dispose()?;
    assert_eq!(probe.delete_count(), 1);
    context.dispose()?;
    Ok(())
}

#[test]
fn disposal_stack_tears_down_in_reverse() -> anyhow::Result<()> {
    let (context, probe, _collector) = tracked_context()?;
    let mut stack = DisposalStack::new();
    let mut handles = Vec::new();
    for kind in [ResourceKind::Buffer, ResourceKind::VertexArray, ResourceKind::Program] {
        let resource = OwnedResource::allocate(&context, kind)?;
        handles.push((kind, resource.handle().raw()));
        stack.push_resource(resource);
    }
    stack.flush()?;

    let deletes: Vec<_> = probe
        .calls()
        .into_iter()
        .filter(|call| matches!(call, NativeCall::Delete(..)))
        .collect();
    let expected: Vec<_> = handles
        .iter()
        .rev()
        .map(|&(kind, raw)| NativeCall::Delete(kind, raw))
        .collect();
    assert_eq!(deletes, expected);
    assert_eq!(probe.live_handles(), 0);
    context.dispose()?;
    Ok(())
}

#[test]
fn disposed_resources_do_not_accumulate_in_the_tracker() -> anyhow::Result<()> {
    init_logging();
    let device = HeadlessDevice::new();
    let probe = device.probe();
    let context = Context::builder()
        .capture_creation_trace(false)
        .build(device)?;
    for _ in 0..10_000 {
        let mut resource = OwnedResource::allocate(&context, ResourceKind::Buffer)?;
        resource.dispose()?;
    }
    for _ in 0..10 {
        assert!(!context.end_frame()?.swept);
    }
    assert_eq!(context.tracked_count()?, 0);
    assert_eq!(probe.live_handles(), 0);
    context.dispose()?;
    Ok(())
}
