// Enqueue a notification envelope into the relay's durable queue
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use pushrelay::config::{self, CONFIG_FILE_PATH};
use pushrelay::logger::{self, LogTag};
use pushrelay::notifications::{decode_json, Decoded};
use pushrelay::queue;

#[derive(Parser, Debug)]
#[command(
    name = "tool_enqueue",
    about = "Write a notification envelope into the configured durable queue"
)]
struct Args {
    /// Relay configuration file (queue connection is read from `[queue]`)
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Queue connection string, overriding the config (`sqlite://<path>`)
    #[arg(long, value_name = "CONNECTION")]
    queue: Option<String>,

    /// Notification type code
    #[arg(long = "type", value_name = "CODE")]
    push_type: i64,

    /// Payload JSON object
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,

    /// Read the payload JSON from a file
    #[arg(long, value_name = "PATH")]
    payload_file: Option<String>,

    /// Originating device id, passed through to clients
    #[arg(long)]
    context_id: Option<String>,

    /// Base64-wrap the body the way some producers do
    #[arg(long)]
    base64: bool,

    /// Enqueue the same envelope this many times
    #[arg(long, default_value_t = 1)]
    count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| CONFIG_FILE_PATH.to_string());
    let mut queue_config = config::read_config_file(&config_path)?.queue;
    if let Some(connection) = &args.queue {
        queue_config.connection = connection.clone();
    }

    if queue_config.connection.trim() == "memory" {
        bail!("an in-memory queue only exists inside the relay process; use sqlite://<path>");
    }

    let queue = queue::from_config(&queue_config)?
        .context("no queue configured; set [queue] connection or pass --queue")?;

    let payload_text = match (&args.payload, &args.payload_file) {
        (Some(payload), _) => payload.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload file '{}'", path))?,
        (None, None) => "{}".to_string(),
    };
    let payload: serde_json::Value =
        serde_json::from_str(&payload_text).context("payload is not valid JSON")?;

    let mut envelope = serde_json::json!({
        "Type": args.push_type,
        "Payload": payload,
    });
    if let Some(context_id) = &args.context_id {
        envelope["ContextId"] = serde_json::Value::String(context_id.clone());
    }
    let json = serde_json::to_string(&envelope)?;

    match decode_json(&json)? {
        Decoded::Known(envelope) => logger::info(
            LogTag::Queue,
            &format!("Enqueueing {} envelope", envelope.push_type),
        ),
        Decoded::Unknown { code, .. } => logger::warning(
            LogTag::Queue,
            &format!("Type {} is not known to the relay; it will be acknowledged and dropped", code),
        ),
    }

    let body = if args.base64 {
        STANDARD.encode(json.as_bytes()).into_bytes()
    } else {
        json.into_bytes()
    };

    for _ in 0..args.count.max(1) {
        let id = queue.enqueue(body.clone()).await?;
        println!("{}", id);
    }

    logger::info(
        LogTag::Queue,
        &format!("Enqueued {} message(s) into {} queue", args.count.max(1), queue.name()),
    );
    Ok(())
}
