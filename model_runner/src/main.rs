use std::{fs, io};

use log::{info, warn};
use tokio::{net::TcpListener, signal};

use model_runner::{
    MonotonicClock, Service,
    config::RuntimeConfig,
    model::{DenseInterpreter, FileBlockStore},
    serve,
    settings::JsonSettings,
};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = RuntimeConfig::from_env()?;
    fs::create_dir_all(config.state_dir())?;

    let settings = JsonSettings::open(config.settings_path())?;
    let blocks = FileBlockStore::open(config.model_path(), config.model_capacity())?;

    let clock = MonotonicClock::new();
    let mut service = Service::start(
        Box::new(settings),
        Box::new(blocks),
        Box::new(DenseInterpreter::new()),
    );

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("listening at {addr}");

    tokio::select! {
        ret = accept_loop(&listener, &mut service, &clock) => ret?,
        _ = signal::ctrl_c() => {
            info!("received SIGTERM");
        }
    }

    Ok(())
}

/// Serves hosts one connection at a time, the service outlives each of them.
async fn accept_loop(
    listener: &TcpListener,
    service: &mut Service,
    clock: &MonotonicClock,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("host connected from {peer}");

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);

        if let Err(e) = serve(service, clock, rx, tx).await {
            warn!("connection with {peer} failed: {e}");
        }
    }
}
