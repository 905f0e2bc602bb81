use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use clap::Parser;
use dotenv::dotenv;
use stonetcp::codec::{FrameHeader, WriteParams};
use stonetcp::service::CodecKind;
use stonetcp::{
    setup_tracing, AppError, AppResult, Server, ServerConfig, Session, SessionHandler,
    SessionRegistry,
};
use tokio::{runtime, signal};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// directory of the rolling log files
    #[arg(long, default_value = "./logs")]
    pub log_dir: PathBuf,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

/// Echoes frames back, or with the targeted layout forwards them to the
/// session named by the target id. Target id 0 means echo.
struct Relay {
    sessions: SessionRegistry,
    targeted: bool,
}

impl Relay {
    async fn forward(&self, session: &Arc<Session>, frame: Bytes) -> AppResult<usize> {
        let (header, payload) = FrameHeader::split(&frame)?;
        if header.target_id == 0 {
            let params = WriteParams::msg_type(header.msg_type);
            return session.write(Some(&payload[..]), &params).await;
        }
        let target = self
            .sessions
            .get(header.target_id)
            .ok_or(AppError::SessionClosed(header.target_id))?;
        // the receiver sees who sent it
        let params = WriteParams::msg_type(header.msg_type).with_target(session.id());
        target.write(Some(&payload[..]), &params).await
    }
}

#[async_trait]
impl SessionHandler for Relay {
    async fn on_data(&self, session: &Arc<Session>, frame: Bytes) {
        session.heart();
        let result = if self.targeted {
            self.forward(session, frame).await
        } else {
            session.write(Some(&frame[..]), &WriteParams::default()).await
        };
        if let Err(err) = result {
            warn!("session {} relay failed: {}", session.id(), err);
        }
    }

    async fn on_close(&self, session: &Arc<Session>) {
        debug!("session {} from {} gone", session.id(), session.peer_addr());
    }

    async fn on_error(&self, session: &Arc<Session>, err: &AppError) {
        warn!("session {} error: {}", session.id(), err);
    }
}

async fn run_tcp_server(config: ServerConfig) -> AppResult<()> {
    let sessions = SessionRegistry::default();
    let relay = Arc::new(Relay {
        sessions: sessions.clone(),
        targeted: config.codec.kind == CodecKind::Targeted,
    });

    let server = Server::from_config(&config)
        .sessions(sessions)
        .on_connect(move |session| session.set_shared_handler(relay.clone()))
        .bind(&config.network.listen)
        .await?;

    tokio::select! {
        res = server.run() => {
            if let Err(err) = res {
                error!(cause = %err, "failed to accept");
            }
        }
        _ = signal::ctrl_c() => {
            info!("get shutdown signal");
        }
    }
    server.shutdown().await;
    Ok(())
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let server_config = ServerConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", server_config);
        return Ok(());
    }

    let _guard = setup_tracing(&commandline.log_dir, commandline.verbose);

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("stonetcp-worker")
        .enable_all()
        .build()?;
    rt.block_on(run_tcp_server(server_config))
}
