use clap::{Parser, Subcommand};
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ui_sync::config::{self, Platform};
use ui_sync::diagnostics::{
    self, FsArtifactSink, INSPECT_LIMIT, OutputEncoding, identifying_nodes, latest_tree_dump,
    print_inspection,
};
use ui_sync::harness::{FlowConfig, RunContext, error_chain, run_flow, scenarios};
use ui_sync::runner::{FlowResult, StepStatus};
use ui_sync::screen::catalog;
use ui_sync::session::{DeviceSession, MockFactory, SessionFactory, WebDriverFactory};
use ui_sync::snapshot::{MockDevice, UiTree, WebDriverConfig, tree_from_xml};
use ui_sync::sync::{SystemClock, WaitOptions};

/// ui-sync - scripted UI verification against WebDriver and Appium servers
#[derive(Parser, Debug)]
#[command(
    name = "ui-sync",
    about = "Drive screens on a remote browser or device with explicit, bounded waits",
    after_help = "ENVIRONMENT VARIABLES:\n\
        UI_SYNC_SERVER_URL         WebDriver / Appium server URL\n\
        UI_SYNC_PLATFORM           android or web\n\
        ANDROID_DEVICE_NAME        Device name capability\n\
        ANDROID_UDID               Device udid capability\n\
        UI_SYNC_APP_PACKAGE        App terminated on session release\n\
        UI_SYNC_TIMEOUT            Page-object wait timeout (s)\n\
        UI_SYNC_POLL_INTERVAL      Poll interval (ms)\n\
        UI_SYNC_ARTIFACTS_DIR      Directory for artifacts\n\
        UI_SYNC_TEXT_LIMIT         Visible texts printed per dump"
)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Platform to drive (overrides UI_SYNC_PLATFORM)
    #[arg(long, global = true)]
    platform: Option<Platform>,

    /// Server URL (overrides UI_SYNC_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Use a scripted device whose screens are read from a JSON array of trees
    #[arg(long, global = true, value_name = "FRAMES")]
    mock: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow file
    Run {
        /// Path to the flow JSON
        flow: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a built-in flow: open-settings, open-internet, practice-form
    Scenario {
        name: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in screen catalog as JSON
    Screens,

    /// List identifying nodes of a saved tree dump
    Inspect {
        /// Tree dump to read (default: newest .xml in the artifacts directory)
        path: Option<PathBuf>,

        /// Keep rows whose id, text, or description contains this
        #[arg(short, long)]
        filter: Option<String>,

        /// Rows to print
        #[arg(short, long, default_value_t = INSPECT_LIMIT)]
        limit: usize,
    },

    /// Save a screenshot and tree dump of the current screen
    Capture {
        #[arg(short, long, default_value = "manual")]
        prefix: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let chain = error_chain(&*e);
            eprintln!("Error: {}", chain[0]);
            for cause in &chain[1..] {
                eprintln!("  caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool, Box<dyn Error>> {
    let cfg = config::get();
    let mut driver = WebDriverConfig::from_config(cfg);
    if let Some(platform) = args.platform {
        driver = driver.with_platform(platform);
    }
    if let Some(url) = &args.server {
        driver = driver.with_server_url(url.clone());
    }
    let frames = args.mock.as_deref().map(load_frames).transpose()?;

    match args.command {
        Commands::Run { flow, json } => {
            let flow = FlowConfig::from_file(&flow)?;
            execute(&flow, &driver, frames, json)
        }

        Commands::Scenario { name, json } => {
            let fixtures = Path::new(&cfg.artifacts.dir).join("fixtures");
            let flow = scenarios::by_name(&name, &fixtures)?.ok_or_else(|| {
                format!(
                    "Unknown scenario '{}'. Use one of: {}",
                    name,
                    scenarios::NAMES.join(", ")
                )
            })?;
            execute(&flow, &driver, frames, json)
        }

        Commands::Screens => {
            println!("{}", serde_json::to_string_pretty(&catalog::all())?);
            Ok(true)
        }

        Commands::Inspect {
            path,
            filter,
            limit,
        } => {
            let path = match path {
                Some(p) => p,
                None => latest_tree_dump(Path::new(&cfg.artifacts.dir))?
                    .ok_or_else(|| format!("No .xml dumps found in {}", cfg.artifacts.dir))?,
            };
            let raw = std::fs::read_to_string(&path)?;
            let tree = tree_from_xml(&raw)?;
            let rows = identifying_nodes(&tree, filter.as_deref());

            println!("Source: {}", path.display());
            println!("Identifying nodes: {}", rows.len());
            print_inspection(&rows, limit, &mut io::stdout().lock())?;
            Ok(true)
        }

        Commands::Capture { prefix } => match frames {
            Some(frames) => capture(&mut mock_factory(frames), &driver, &prefix),
            None => capture(&mut WebDriverFactory::new(driver.clone()), &driver, &prefix),
        },
    }
}

fn load_frames(path: &Path) -> Result<Vec<UiTree>, Box<dyn Error>> {
    Ok(config::load_json(path)?)
}

fn mock_factory(frames: Vec<UiTree>) -> MockFactory<impl FnMut() -> MockDevice> {
    MockFactory::new(move || MockDevice::new(frames.clone()))
}

/// App to terminate on release; browsers have none
fn app_package(driver: &WebDriverConfig) -> Option<String> {
    match driver.platform {
        Platform::Android => Some(config::app_package()),
        Platform::Web => None,
    }
}

fn execute(
    flow: &FlowConfig,
    driver: &WebDriverConfig,
    frames: Option<Vec<UiTree>>,
    json: bool,
) -> Result<bool, Box<dyn Error>> {
    let result = match frames {
        Some(frames) => execute_with(flow, &mut mock_factory(frames), driver)?,
        None => execute_with(flow, &mut WebDriverFactory::new(driver.clone()), driver)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(result.success)
}

fn execute_with<F: SessionFactory>(
    flow: &FlowConfig,
    factory: &mut F,
    driver: &WebDriverConfig,
) -> Result<FlowResult, Box<dyn Error>> {
    let clock = SystemClock::new();
    let mut sink = FsArtifactSink::from_config();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut ctx = RunContext {
        clock: &clock,
        options: WaitOptions::from_config(),
        sink: &mut sink,
        text_limit: config::text_limit(),
        encoding: OutputEncoding::detect(),
        out: &mut out,
        app_package: app_package(driver),
    };
    Ok(run_flow(flow, factory, &mut ctx)?)
}

fn capture<F: SessionFactory>(
    factory: &mut F,
    driver: &WebDriverConfig,
    prefix: &str,
) -> Result<bool, Box<dyn Error>> {
    let mut sink = FsArtifactSink::from_config();
    // Capture only; leave the app running
    let mut session = DeviceSession::open(factory, None)?;
    let bundle = diagnostics::capture(session.backend_mut()?, &mut sink, prefix, config::text_limit());
    session.release();

    info!(platform = %driver.platform, "capture finished");
    let saved: Vec<&PathBuf> = bundle
        .screenshot_path
        .iter()
        .chain(bundle.tree_path.iter())
        .collect();
    for path in &saved {
        println!("Saved: {}", path.display());
    }
    bundle.dump(OutputEncoding::detect(), &mut io::stdout().lock());
    Ok(saved.len() == 2)
}

fn print_summary(result: &FlowResult) {
    let verdict = if result.success { "PASSED" } else { "FAILED" };
    println!("Flow {} {} (session {})", result.flow, verdict, result.session_id);

    for step in &result.steps {
        let mark = match step.status {
            StepStatus::Passed => "ok",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "FAILED",
            StepStatus::NotRun => "-",
        };
        let ticks = step
            .ticks
            .map(|t| format!(" ({} ticks)", t))
            .unwrap_or_default();
        println!("  {:>2}. {:<7} {}{}", step.index, mark, step.label, ticks);
        if let Some(detail) = &step.detail {
            println!("      {}", detail);
        }
        for path in &step.artifacts {
            println!("      saved {}", path.display());
        }
    }

    if let Some(error) = &result.error {
        println!("\nError: {}", error.join(": "));
    }
    if let Some(bundle) = &result.diagnostics {
        for path in bundle.screenshot_path.iter().chain(bundle.tree_path.iter()) {
            println!("Failure artifact: {}", path.display());
        }
    }
    let _ = io::stdout().flush();
}
