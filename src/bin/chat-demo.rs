//! Customer chat demo
//!
//! Non-interactive driver: redeems a chat link, lets the customer send a few
//! messages, and logs what the owner's directory, timeline and notifier see.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use customer_chat_core::im::conversation::DirectoryListener;
use customer_chat_core::im::message::{TimelineEntry, TimelineListener};
use customer_chat_core::im::notification::synth::peak;
use customer_chat_core::im::notification::{HeadlessSurface, PcmAudioBackend, PcmSink, PermissionState};
use customer_chat_core::im::notifier::{banner_tag, NotifierListener};
use customer_chat_core::im::types::{ConversationEntry, MediaType, Message, SenderType};
use customer_chat_core::im::{ChatClient, ClientConfig};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PermissionArg {
    Default,
    Granted,
    Denied,
    Unsupported,
}

impl From<PermissionArg> for PermissionState {
    fn from(arg: PermissionArg) -> Self {
        match arg {
            PermissionArg::Default => PermissionState::Default,
            PermissionArg::Granted => PermissionState::Granted,
            PermissionArg::Denied => PermissionState::Denied,
            PermissionArg::Unsupported => PermissionState::Unsupported,
        }
    }
}

/// Customer chat demo
#[derive(Parser, Debug)]
#[command(name = "chat-demo")]
#[command(about = "Simulates a customer chat session end to end", long_about = None)]
struct Args {
    /// Owner id
    #[arg(short, long, default_value = "owner-demo")]
    owner: String,

    /// Number of customer messages to send
    #[arg(short, long, default_value = "3")]
    messages: u32,

    /// Banner permission before the first interaction; prompts are always granted
    #[arg(long, value_enum, default_value = "default")]
    permission: PermissionArg,

    /// Notification volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// SQLite URL
    #[arg(long, default_value = "sqlite::memory:")]
    db: String,

    /// JSON client config; overrides --owner and --db
    #[arg(long)]
    config: Option<String>,

    /// Log filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info,customer_chat_core=debug")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<String>,
}

/// Logs to stdout and, optionally, to a file
fn init_logger(log_level: &str, log_file: Option<&str>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("[Demo] logging to stdout and {}", path);
    }
    Ok(())
}

/// Stands in for a speaker
struct LoggingSink;

impl PcmSink for LoggingSink {
    fn write(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        info!(
            "[Demo/Audio] 🔔 {:.2}s cue, peak {:.2}",
            samples.len() as f32 / sample_rate as f32,
            peak(samples)
        );
        Ok(())
    }
}

struct DemoDirectoryListener;

#[async_trait::async_trait]
impl DirectoryListener for DemoDirectoryListener {
    async fn on_new_message(
        &self,
        conversation_id: String,
        customer_name: String,
        content: String,
        media_type: Option<MediaType>,
        _file_name: Option<String>,
    ) {
        info!(
            "[Demo/Directory] 📨 {} in {}: {} {}",
            customer_name,
            conversation_id,
            media_type.map(|m| m.glyph()).unwrap_or_default(),
            content
        );
    }

    async fn on_conversations_changed(&self, conversations: Vec<ConversationEntry>) {
        for entry in conversations.iter().take(5) {
            info!(
                "[Demo/Directory]   - {} | unread: {} | AI: {}",
                entry.customer_name, entry.conversation.unread_owner_count, entry.conversation.ai_enabled
            );
        }
    }

    async fn on_highlight_changed(&self, conversation_id: String, highlighted: bool) {
        info!("[Demo/Directory] highlight {} = {}", conversation_id, highlighted);
    }
}

struct DemoTimelineListener(SenderType);

#[async_trait::async_trait]
impl TimelineListener for DemoTimelineListener {
    async fn on_new_message(&self, message: Message) {
        info!("[Demo/Timeline:{}] ✨ {}", self.0, message.content);
    }

    async fn on_timeline_changed(&self, entries: Vec<TimelineEntry>) {
        info!("[Demo/Timeline:{}] {} messages", self.0, entries.len());
    }
}

struct DemoNotifierListener;

#[async_trait::async_trait]
impl NotifierListener for DemoNotifierListener {
    async fn on_unread_count_changed(&self, unread_count: u32) {
        info!("[Demo/Notifier] 📬 total unread: {}", unread_count);
    }

    async fn on_has_new_message_changed(&self, has_new_message: bool) {
        info!("[Demo/Notifier] has new message: {}", has_new_message);
    }

    async fn on_notification_clicked(&self, conversation_id: String) {
        info!("[Demo/Notifier] 👆 banner clicked, opening {}", conversation_id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, args.log_file.as_deref())?;

    let config = match &args.config {
        Some(path) => {
            let body = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
            ClientConfig::from_json(&body)?
        }
        None => ClientConfig::new(args.owner.clone(), args.db.clone()),
    };
    let owner_id = config.owner_id.clone();

    let surface = Arc::new(HeadlessSurface::new(args.permission.into(), PermissionState::Granted));
    let audio = Arc::new(PcmAudioBackend::new(Arc::new(LoggingSink)));
    let client = ChatClient::connect(config, surface.clone(), audio).await?;
    if let Some(volume) = args.volume {
        client.channel().set_volume(volume).await;
    }

    let notifier = client.notifier(Arc::new(DemoNotifierListener));
    notifier.start(&owner_id).await;
    let directory = client.directory(Arc::new(DemoDirectoryListener));
    directory.mount(&owner_id).await;
    notifier.on_user_interaction().await;
    info!("[Demo] banner permission: {:?}", notifier.permission());

    let conversation = client.redeem_link("customer-1", Some("Maria")).await?;
    info!("[Demo] conversation {} ready", conversation.id);

    let customer = client.timeline(SenderType::Customer, Arc::new(DemoTimelineListener(SenderType::Customer)));
    customer.open(&conversation.id).await;
    for i in 1..=args.messages {
        customer.send_message(&format!("Hello, question #{}", i)).await;
    }
    info!(
        "[Demo] unread: {}, has new: {}, banners: {:?}",
        notifier.unread_count(),
        notifier.has_new_message(),
        surface.visible()
    );

    surface.click(&banner_tag(&conversation.id));
    let owner = client.timeline(SenderType::Owner, Arc::new(DemoTimelineListener(SenderType::Owner)));
    owner.open(&conversation.id).await;
    owner.send_message("Hi Maria, how can I help?").await;
    directory.toggle_ai(&conversation.id, true).await?;

    // let the highlight and "new" flags run out
    sleep(Duration::from_millis(client.config().has_new_ms + 100)).await;
    info!(
        "[Demo] unread: {}, has new: {}, highlighted: {:?}",
        notifier.unread_count(),
        notifier.has_new_message(),
        directory.highlighted()
    );

    owner.close();
    customer.close();
    directory.unmount();
    notifier.stop().await;
    client.close().await;
    info!("[Demo] 👋 done");
    Ok(())
}
