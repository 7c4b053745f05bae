use anyhow::Result;
use webdyn::audio::bound::BoundElementSet;
use webdyn::audio::host::ContextState;
use webdyn::audio::peak_meter::METER_FLOOR_DB;
use webdyn::audio::session::{AttachError, AudioGraphSession, GraphError, GraphState};
use webdyn::effects::chain::StageKind;
use webdyn::effects::{EffectSettings, SettingType};
use webdyn::page::ElementId;
use webdyn::sim::{SimBackend, SimContext, sine_block};

const FFT_SIZE: usize = 1024;
const E1: ElementId = ElementId(1);

fn session() -> AudioGraphSession<SimContext> {
    AudioGraphSession::new(FFT_SIZE)
}

fn custom_settings() -> Result<EffectSettings> {
    let mut settings = EffectSettings::default();
    settings.set_parameter(SettingType::Compressor, "threshold", -18.0)?;
    settings.set_parameter(SettingType::Limiter, "release", 0.08)?;
    settings.set_parameter(SettingType::Amplifier, "gain", 2.5)?;
    Ok(settings)
}

fn live(session: &AudioGraphSession<SimContext>) -> EffectSettings {
    session
        .chain()
        .map(|chain| chain.live_settings())
        .unwrap_or_else(EffectSettings::neutral)
}

#[tokio::test]
async fn init_binds_element_and_applies_settings() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    let settings = custom_settings()?;

    graph.init(&backend, &mut bound, E1, &settings, true).await?;

    assert_eq!(graph.state(), GraphState::Active);
    assert_eq!(graph.element(), Some(E1));
    assert!(bound.contains(E1));
    assert_eq!(live(&graph), settings);
    assert_eq!(graph.last_applied(), &settings);
    assert_eq!(graph.context_state(), Some(ContextState::Running));

    Ok(())
}

#[tokio::test]
async fn bound_element_can_never_be_bound_again() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();

    let mut first = session();
    first
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await?;
    first.disconnect().await;
    assert_eq!(first.state(), GraphState::Disconnected);
    assert!(bound.contains(E1));

    let mut second = session();
    let err = second
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, AttachError::AlreadyBound(ElementId(1))));
    assert_eq!(second.state(), GraphState::Uninitialized);
    assert!(second.chain().is_none());
    assert_eq!(backend.contexts_created(), 1);
    assert_eq!(backend.open_contexts(), 0);

    Ok(())
}

#[tokio::test]
async fn disable_then_enable_restores_parameters_exactly() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    let settings = custom_settings()?;
    graph.init(&backend, &mut bound, E1, &settings, true).await?;

    graph.set_effects_enabled(false, None)?;
    assert_eq!(graph.state(), GraphState::Bypassed);
    assert_eq!(live(&graph), EffectSettings::neutral());
    assert_eq!(graph.last_applied(), &settings);

    graph.set_effects_enabled(true, None)?;
    assert_eq!(graph.state(), GraphState::Active);
    assert_eq!(live(&graph), settings);

    Ok(())
}

#[tokio::test]
async fn update_while_bypassed_is_cached_until_enabled() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await?;
    graph.set_effects_enabled(false, None)?;

    let updated = custom_settings()?;
    graph.update_settings(&updated)?;

    assert_eq!(live(&graph), EffectSettings::neutral());
    assert_eq!(
        graph
            .chain()
            .and_then(|c| c.parameter(StageKind::Compressor, "ratio")),
        Some(1.0)
    );

    graph.set_effects_enabled(true, None)?;
    assert_eq!(live(&graph), updated);

    Ok(())
}

#[tokio::test]
async fn enabling_with_settings_replaces_cache() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), false)
        .await?;
    assert_eq!(graph.state(), GraphState::Bypassed);
    assert_eq!(live(&graph), EffectSettings::neutral());

    let settings = custom_settings()?;
    graph.set_effects_enabled(true, Some(&settings))?;

    assert_eq!(live(&graph), settings);
    assert_eq!(graph.last_applied(), &settings);

    Ok(())
}

#[tokio::test]
async fn suspended_context_gets_one_retry() -> Result<()> {
    let backend = SimBackend::default();
    backend.start_suspended(true);
    backend.fail_next_capture();
    let mut bound = BoundElementSet::new();
    let mut graph = session();

    graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await?;

    assert_eq!(graph.state(), GraphState::Active);
    assert_eq!(backend.contexts_created(), 2);
    assert_eq!(backend.open_contexts(), 1);

    Ok(())
}

#[tokio::test]
async fn running_context_failure_is_not_retried() {
    let backend = SimBackend::default();
    backend.fail_next_capture();
    let mut bound = BoundElementSet::new();
    let mut graph = session();

    let result = graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await;

    assert!(matches!(result, Err(AttachError::Host(_))));
    assert_eq!(graph.state(), GraphState::Uninitialized);
    assert!(!bound.contains(E1));
    assert_eq!(backend.contexts_created(), 1);
    assert_eq!(backend.open_contexts(), 0);
}

#[tokio::test]
async fn second_failure_after_retry_leaves_nothing_allocated() {
    let backend = SimBackend::default();
    backend.start_suspended(true);
    backend.fail_element(E1);
    let mut bound = BoundElementSet::new();
    let mut graph = session();

    let result = graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await;

    assert!(result.is_err());
    assert_eq!(backend.contexts_created(), 2);
    assert_eq!(backend.open_contexts(), 0);
    assert!(bound.is_empty());
}

#[tokio::test]
async fn operations_on_a_dead_graph_are_rejected() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();

    assert_eq!(
        graph.set_effects_enabled(true, None),
        Err(GraphError::NotLive(GraphState::Uninitialized))
    );

    graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await?;
    graph.disconnect().await;

    assert_eq!(
        graph.update_settings(&EffectSettings::default()),
        Err(GraphError::NotLive(GraphState::Disconnected))
    );
    assert!(matches!(
        graph
            .init(&backend, &mut bound, ElementId(2), &EffectSettings::default(), true)
            .await,
        Err(AttachError::InvalidState(GraphState::Disconnected))
    ));

    Ok(())
}

#[tokio::test]
async fn meter_follows_rendered_audio() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();

    assert_eq!(graph.read_meter(), METER_FLOOR_DB);

    graph
        .init(&backend, &mut bound, E1, &EffectSettings::neutral(), true)
        .await?;
    assert_eq!(graph.read_meter(), METER_FLOOR_DB);

    let mut block = sine_block(1000.0, 0.5, 48_000.0, 0, FFT_SIZE);
    graph.render(&mut block);
    let level = graph.read_meter();
    assert!((level + 6.02).abs() < 0.1, "meter read {level}");

    graph.disconnect().await;
    assert_eq!(graph.read_meter(), METER_FLOOR_DB);
    assert_eq!(backend.open_contexts(), 0);

    Ok(())
}

#[tokio::test]
async fn suspended_context_renders_silence_until_resumed() -> Result<()> {
    let backend = SimBackend::default();
    backend.start_suspended(true);
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    graph
        .init(&backend, &mut bound, E1, &EffectSettings::neutral(), true)
        .await?;

    let mut block = vec![0.5f32; 64];
    graph.render(&mut block);
    assert!(block.iter().all(|&s| s == 0.0));

    graph.resume_if_suspended().await?;
    assert_eq!(graph.context_state(), Some(ContextState::Running));

    let mut block = vec![0.5f32; 64];
    graph.render(&mut block);
    assert!(block.iter().all(|&s| (s - 0.5).abs() < 1e-6));

    Ok(())
}

#[tokio::test]
async fn out_of_range_update_survives_bypass_round_trip() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    graph
        .init(&backend, &mut bound, E1, &EffectSettings::default(), true)
        .await?;

    let mut settings = EffectSettings::default();
    settings.compressor.ratio = 50.0;
    graph.update_settings(&settings)?;
    let before = live(&graph);

    graph.set_effects_enabled(false, None)?;
    graph.set_effects_enabled(true, None)?;

    assert_eq!(before.compressor.ratio, 20.0);
    assert_eq!(live(&graph), before);
    assert_eq!(graph.last_applied(), &before);

    Ok(())
}

#[tokio::test]
async fn zero_ratio_seed_renders_finite_audio() -> Result<()> {
    let backend = SimBackend::default();
    let mut bound = BoundElementSet::new();
    let mut graph = session();
    let mut settings = EffectSettings::default();
    settings.compressor.ratio = 0.0;
    settings.limiter.ratio = 0.0;

    graph.init(&backend, &mut bound, E1, &settings, true).await?;

    let mut block = vec![0.5f32; FFT_SIZE];
    graph.render(&mut block);

    assert!(block.iter().all(|s| s.is_finite()));
    assert!(graph.read_meter().is_finite());
    assert_eq!(live(&graph).compressor.ratio, 1.0);

    Ok(())
}
