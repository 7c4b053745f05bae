use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use webdyn::effects::SettingType;
use webdyn::page::{MediaKind, MutationRecord, NodeInfo, PageEvent, ReadyState};
use webdyn::protocol::{Origin, PageId, Request, Response};
use webdyn::runtime::{Background, PageContext, PageOptions, StoreHandle};
use webdyn::settings::AppConfig;
use webdyn::sim::{SimBackend, SimDocument, sine_block};
use webdyn::store::JsonFileStorage;
use webdyn::ui::ControlSurface;

#[derive(Parser, Debug)]
#[command(name = "webdyn")]
#[command(version)]
#[command(about = "Compressor, limiter and gain for the media playing on a page.")]
struct Args {
    #[arg(long, env = "WEBDYN_STORAGE", help = "JSON file holding the stored settings")]
    storage: Option<PathBuf>,
    #[arg(long, env = "WEBDYN_CONFIG", help = "Config file to use instead of the default")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored settings and master toggle
    Show,
    /// Change one parameter, e.g. `set compressor threshold -18`
    Set {
        setting_type: SettingType,
        parameter: String,
        #[arg(allow_hyphen_values = true)]
        value: f32,
    },
    /// Restore the default settings
    Reset,
    /// Turn the effects on
    Enable,
    /// Turn the effects off (bypass)
    Disable,
    /// Write the defaults for both records, as on first install
    Install,
    /// Run a page, the store and a control surface against a simulated host
    Simulate {
        #[arg(long, default_value_t = 40)]
        blocks: usize,
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    info!("webdyn v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("failed to load config")?;
    info!("Config:\n{config}");

    let storage_path = args.storage.clone().unwrap_or_else(|| config.storage_path.clone());
    let (store, background) = Background::spawn(JsonFileStorage::new(&storage_path)).await;
    info!("Using storage at {}", storage_path.display());

    let result = match args.command {
        Command::Show => send(&store, &Request::GetSettings).await,
        Command::Set {
            setting_type,
            parameter,
            value,
        } => {
            send(
                &store,
                &Request::UpdateSetting {
                    setting_type,
                    parameter,
                    value,
                },
            )
            .await
        }
        Command::Reset => send(&store, &Request::ResetToDefaults).await,
        Command::Enable => send(&store, &Request::SetEnabledState { is_enabled: true }).await,
        Command::Disable => send(&store, &Request::SetEnabledState { is_enabled: false }).await,
        Command::Install => {
            store.install().await.context("store stopped during install")?;
            send(&store, &Request::GetSettings).await
        }
        Command::Simulate { blocks, frequency } => {
            simulate(&store, &config, blocks, frequency).await
        }
    };

    store.shutdown();
    background.await.context("background task panicked")?;
    result
}

async fn send(store: &StoreHandle, request: &Request) -> Result<()> {
    let response = store
        .send_request(Origin::Ui, request)
        .await
        .with_context(|| format!("failed to send {}", request.action()))?;
    print_response(&response)
}

fn print_response(response: &Response) -> Result<()> {
    let json = serde_json::to_string_pretty(response).context("failed to encode response")?;
    println!("{json}");
    if !response.is_success() {
        bail!(
            "request failed: {}",
            response.message.as_deref().unwrap_or("no message")
        );
    }
    Ok(())
}

async fn simulate(
    store: &StoreHandle,
    config: &AppConfig,
    blocks: usize,
    frequency: f32,
) -> Result<()> {
    const BLOCK: usize = 512;

    let sample_rate = config.analyser.sample_rate as f32;
    let backend = SimBackend::new(sample_rate);
    let document = SimDocument::new();

    let paused = document.add(MediaKind::Audio, ReadyState::HaveEnoughData, true);
    let playing = document.add(MediaKind::Video, ReadyState::HaveEnoughData, false);
    println!("-- page has {paused} (paused) and {playing} (playing)");

    let mut surface = ControlSurface::open(store.clone())
        .await
        .context("failed to open control surface")?;
    let (page, page_task) = PageContext::spawn(
        PageId(1),
        backend.clone(),
        document.clone(),
        store.clone(),
        PageOptions::from(config),
    )
    .context("failed to start page")?;

    let settle = Duration::from_millis(config.meter_interval_ms.max(10) * 2);
    let mut offset = 0;
    for n in 0..blocks {
        let block = sine_block(frequency, 0.8, sample_rate, offset, BLOCK);
        offset += BLOCK;
        let out = page.render(block).await.context("page stopped")?;

        if n == blocks / 2 {
            println!("-- removing the playing element {playing}");
            document.remove(playing);
            page.dom(PageEvent::Mutations(vec![MutationRecord::ChildList {
                added: Vec::new(),
                removed: vec![NodeInfo::media(playing)],
            }]))
            .context("page stopped")?;
        }

        if n % 10 == 0 {
            tokio::time::sleep(settle).await;
            surface.poll_events();
            let peak = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            let snapshot = page.snapshot().await.context("page stopped")?;
            println!(
                "block {n:>4}: bound {:<5} out peak {peak:.3}  meter {}",
                snapshot
                    .bound
                    .map_or_else(|| "none".to_string(), |e| e.to_string()),
                surface.meter().text
            );
        }
    }

    println!("-- disabling effects");
    surface.toggle(false).await.context("toggle failed")?;
    tokio::time::sleep(settle).await;
    let snapshot = page.snapshot().await.context("page stopped")?;
    println!("graph {:?} on {:?}", snapshot.graph, snapshot.bound);
    surface.toggle(true).await.context("toggle failed")?;

    page.shutdown();
    page_task.await.context("page task panicked")?;

    let state = store.inspect().await.context("store stopped")?;
    println!(
        "contexts created {}, open {}, active page {:?}",
        backend.contexts_created(),
        backend.open_contexts(),
        state.active_page
    );
    Ok(())
}
