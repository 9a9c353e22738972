use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zelna::display::ConsoleDisplay;
use zelna::input::ButtonPin;
use zelna::integration::{AssistantConfig, AssistantRuntime};
use zelna::messages::{AssistantEvent, Button};

/// Zelna - push-to-talk voice assistant
#[derive(Parser)]
#[command(name = "zelna", version, about)]
struct Cli {
    /// WebSocket endpoint of the conversation service
    #[arg(long, env = "ZELNA_URL", default_value = "ws://localhost:8000/ws")]
    url: String,

    /// Bearer token sent when connecting
    #[arg(long, env = "ZELNA_TOKEN")]
    token: Option<String>,

    /// Whisper ggml model
    #[arg(long, env = "ZELNA_WHISPER_MODEL", default_value = "models/ggml-base.en.bin")]
    model: PathBuf,

    /// Language to transcribe
    #[arg(long, default_value = "en")]
    language: String,

    /// Player used for reply clips
    #[arg(long, env = "ZELNA_PLAYER", default_value = "mpg123")]
    player: String,

    /// Player arguments; `{clip}` is replaced by the clip path
    #[arg(long = "player-arg", allow_hyphen_values = true)]
    player_args: Vec<String>,

    /// Seconds to wait before reconnecting
    #[arg(long, default_value = "5")]
    backoff: u64,

    #[arg(long, default_value = "17")]
    power_pin: u32,

    #[arg(long, default_value = "27")]
    scroll_up_pin: u32,

    #[arg(long, default_value = "22")]
    scroll_down_pin: u32,

    /// Use the stub GPIO backend (no buttons)
    #[arg(long, env = "ZELNA_STUB_GPIO")]
    stub_gpio: bool,

    /// Run without a microphone
    #[arg(long)]
    no_audio: bool,
}

impl Cli {
    fn into_config(self) -> AssistantConfig {
        let mut config = AssistantConfig::with_endpoint(self.url, self.model);
        if let Some(token) = self.token {
            config = config.with_auth_token(token);
        }
        if !self.player_args.is_empty() {
            config = config.with_player(self.player, self.player_args);
        } else {
            config.playback.program = self.player;
        }
        if self.stub_gpio {
            config = config.without_gpio();
        }
        if self.no_audio {
            config = config.without_audio_input();
        }

        config.whisper.language = Some(self.language).filter(|lang| lang.as_str() != "auto");
        config.session.backoff = Duration::from_secs(self.backoff);
        config.buttons.pins = vec![
            ButtonPin {
                button: Button::Power,
                pin: self.power_pin,
            },
            ButtonPin {
                button: Button::ScrollUp,
                pin: self.scroll_up_pin,
            },
            ButtonPin {
                button: Button::ScrollDown,
                pin: self.scroll_down_pin,
            },
        ];
        config
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zelna=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Cli::parse().into_config();

    info!("Starting Zelna voice assistant");

    let runtime = AssistantRuntime::new(config).context("invalid configuration")?;

    // Ctrl-C becomes an ordinary shutdown event on the bus
    let shutdown_tx = runtime.publisher();
    std::thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            let signals = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Signal handling unavailable: {}", e);
                    return;
                }
            };
            if signals.block_on(tokio::signal::ctrl_c()).is_ok() {
                info!("Interrupt received");
                let _ = shutdown_tx.send(AssistantEvent::Shutdown);
            }
        })
        .context("failed to spawn signal thread")?;

    runtime.run(Box::new(ConsoleDisplay::new()))?;
    Ok(())
}
