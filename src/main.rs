use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use voice_drill::audio::list_input_devices;
use voice_drill::{
    create_router, AnswerMetadata, AppState, AudioBackendFactory, AudioSource, Config, Language,
    SessionEvent, SessionMetadata, SpeechSession, SurveyMetadata,
};

#[derive(Parser)]
#[command(name = "voice-drill")]
#[command(about = "Spoken answers for math drills: microphone to speech server")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voice-drill")]
    config: String,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one drill example by voice
    Answer {
        #[arg(long)]
        student: i64,

        #[arg(long)]
        example: i64,

        /// Answer input type of the example
        #[arg(long, default_value = "INLINE")]
        input_type: String,

        /// Practice record timestamp (default: now)
        #[arg(long)]
        record_date: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Answer an open survey question by voice
    Survey {
        #[arg(long)]
        question: String,

        /// Comma-separated skill IDs
        #[arg(long, value_delimiter = ',')]
        skills: Vec<i64>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List audio input devices
    Devices,

    /// Run the local HTTP control API
    Serve {
        /// Stream this WAV file instead of the microphone for every session
        #[arg(long)]
        wav: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Stream this WAV file instead of the microphone
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Replay the WAV file as fast as possible
    #[arg(long)]
    fast: bool,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Recognizer language (cs, en)
    #[arg(short, long)]
    language: Option<Language>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "voice_drill=info,tower_http=info",
        1 => "voice_drill=debug,tower_http=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let cfg = Config::load(&cli.config).context("Failed to load config")?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Answer {
            student,
            example,
            input_type,
            record_date,
            run,
        } => {
            let record_date =
                record_date.unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            let metadata = AnswerMetadata::new(student, example, record_date, input_type);
            run_session(&cfg, metadata.into(), run).await
        }
        Commands::Survey {
            question,
            skills,
            run,
        } => run_session(&cfg, SurveyMetadata::new(question, skills).into(), run).await,
        Commands::Devices => {
            let devices = list_input_devices()?;
            if devices.is_empty() {
                println!("No input devices found");
            }
            for device in devices {
                println!("{}", device);
            }
            Ok(())
        }
        Commands::Serve { wav } => serve(&cfg, wav).await,
    }
}

fn audio_source(wav: Option<PathBuf>, realtime: bool) -> AudioSource {
    match wav {
        Some(path) => AudioSource::WavFile { path, realtime },
        None => AudioSource::Microphone,
    }
}

async fn run_session(cfg: &Config, metadata: SessionMetadata, run: RunArgs) -> Result<()> {
    let mut session_config = cfg.session_config();
    if let Some(language) = run.language {
        session_config.language = language;
    }

    let source = audio_source(run.wav, !run.fast);
    let backend = AudioBackendFactory::create(source, cfg.audio_backend_config())?;

    let mut session = SpeechSession::new(session_config);
    let mut events = session.start(metadata, backend).await?;

    let deadline = async {
        match run.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    match event {
                        SessionEvent::Finished | SessionEvent::Closed { .. } => break,
                        SessionEvent::AnswerEvaluated(evaluation) => {
                            match &evaluation.student_answer {
                                Some(answer) if evaluation.is_correct => info!("Heard {}: correct", answer),
                                Some(answer) => info!("Heard {}: incorrect", answer),
                                None => info!("No answer recognized"),
                            }
                            if evaluation.continue_with_next {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                None => break,
            },
            _ = &mut deadline => {
                info!("Duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    let stats = session.stop().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    let transcript = session.transcript().await;
    if !transcript.is_empty() {
        let text: Vec<_> = transcript.iter().map(|segment| segment.text.as_str()).collect();
        println!("{}", text.join(" "));
    }

    Ok(())
}

async fn serve(cfg: &Config, wav: Option<PathBuf>) -> Result<()> {
    let state = AppState::new(
        cfg.session_config(),
        audio_source(wav, true),
        cfg.audio_backend_config(),
    );
    let app = create_router(state.clone());

    let addr = cfg.control_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Control API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await?;

    let stats = state.session.lock().await.stop().await;
    info!("Shut down ({} frames sent in last session)", stats.frames_sent);
    Ok(())
}
