use std::{env, sync::Arc};

use colored::Colorize;
use log::{error, info, warn};
use syncwatch_collab::Coordinator;
use syncwatch_server::{run_server, ConfigError, ServerConfig, ServerContext};
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod logging;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Could not initialize logging: {0}")]
    Logging(#[from] log::SetLoggerError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not build the async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Server stopped unexpectedly: {0}")]
    Server(std::io::Error),
}

impl StartupError {
    fn hint(&self) -> String {
        match self {
            StartupError::Logging(_) => "A logger was already installed, this should not happen.".to_string(),
            StartupError::Config(_) => "Check the SYNCWATCH_* environment variables, then try again.".to_string(),
            StartupError::Runtime(_) => "The operating system refused to start the worker threads. Check the process limits.".to_string(),
            StartupError::Server(_) => "Make sure the port is free, or choose another one with SYNCWATCH_SERVER_PORT.".to_string(),
        }
    }
}

struct Syncwatch {
    config: ServerConfig,
    coordinator: Arc<Coordinator>,
    runtime: Runtime,
}

impl Syncwatch {
    fn new() -> Result<Self, StartupError> {
        let config = ServerConfig::from_env()?;

        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("syncwatch-async")
            .build()
            .map_err(StartupError::Runtime)?;

        let coordinator = Arc::new(Coordinator::new(config.core.clone()));

        Ok(Self {
            config,
            coordinator,
            runtime,
        })
    }

    fn run(self) -> Result<(), StartupError> {
        let Self {
            config,
            coordinator,
            runtime,
        } = self;

        let context = ServerContext::new(coordinator.clone());

        runtime.block_on(async move {
            let sweeper = coordinator.spawn_sweeper();

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Could not listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }

                info!("Shutting down...");
            };

            let result = run_server(context, config.port, shutdown).await;
            sweeper.stop().await;

            result.map_err(StartupError::Server)
        })
    }
}

fn main() {
    let debug = env::var_os("SYNCWATCH_DEBUG").is_some();

    if let Err(error) = logging::init_logger(debug).map_err(StartupError::from) {
        eprintln!("{}", error);
        return;
    }

    let result = Syncwatch::new().and_then(|syncwatch| {
        info!("Initialized successfully.");
        syncwatch.run()
    });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue.", "Syncwatch failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
        std::process::exit(1);
    }
}
