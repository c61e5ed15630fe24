use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use e2e_docker::logging::{LogConfig, Verbosity, init_logging};
use e2e_docker::{DaemonConfig, DaemonController, config};

#[derive(Parser)]
#[command(name = "e2e-docker")]
#[command(version)]
#[command(about = "Drive a local Docker daemon for end-to-end tests")]
struct Cli {
    /// Config file (default: .e2e-docker.yaml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Daemon endpoint passed to docker as -H
    #[arg(long, global = true)]
    socket: Option<String>,

    /// docker executable
    #[arg(long, global = true)]
    docker: Option<String>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a private daemon and keep it running until Enter is pressed
    Daemon {
        /// Root for the daemon's exec/graph dirs, pidfile and socket
        #[arg(long)]
        base_dir: Option<PathBuf>,

        #[arg(long)]
        bridge: Option<String>,

        /// Address block assigned when the bridge has to be created
        #[arg(long)]
        cidr: Option<String>,
    },
    /// Pull images, in order
    Pull {
        #[arg(required = true)]
        images: Vec<String>,
    },
    /// docker run; prints the new container's ID
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Force-remove a container
    Rm { container: String },
    /// Kill a container
    Kill { container: String },
    /// List running container IDs
    Ps {
        /// docker ps --filter expression
        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Check that the daemon answers
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(&LogConfig {
        verbosity: Verbosity::from_occurrences(cli.verbose),
        log_file: cli.log_file.clone(),
    });

    let mut cfg = load_config(&cli)?;
    if let Some(socket) = &cli.socket {
        cfg.socket = socket.clone();
    }
    if let Some(docker) = &cli.docker {
        cfg.docker_exec = docker.clone();
    }

    match cli.command {
        Commands::Daemon {
            base_dir,
            bridge,
            cidr,
        } => {
            cfg.manage_daemon = true;
            if let Some(base_dir) = base_dir {
                cfg.base_dir = base_dir;
            }
            if let Some(bridge) = bridge {
                cfg.bridge = bridge;
            }
            if let Some(cidr) = cidr {
                cfg.cidr = cidr;
            }
            run_daemon(cfg)
        }
        Commands::Pull { images } => {
            DaemonController::new(cfg).pull(&images)?;
            Ok(())
        }
        Commands::Run { args } => {
            let id = DaemonController::new(cfg).run(&args)?;
            println!("{id}");
            Ok(())
        }
        Commands::Rm { container } => {
            DaemonController::new(cfg).remove(&container)?;
            Ok(())
        }
        Commands::Kill { container } => {
            DaemonController::new(cfg).kill(&container)?;
            Ok(())
        }
        Commands::Ps { filter } => {
            for id in DaemonController::new(cfg).list(&filter)? {
                println!("{id}");
            }
            Ok(())
        }
        Commands::Info => {
            let out = DaemonController::new(cfg).info()?;
            print!("{}", out.stdout);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    match &cli.config {
        Some(path) => Ok(DaemonConfig::load_file(path)?.with_env_overrides()),
        None => {
            let cwd = std::env::current_dir().context("cannot determine current directory")?;
            config::load(&cwd)
        }
    }
}

fn run_daemon(cfg: DaemonConfig) -> Result<()> {
    let mut controller = DaemonController::new(cfg);
    controller.start().context("failed to start docker daemon")?;

    println!("{}", controller.socket());
    eprintln!(
        "docker daemon running (pid {}); press Enter to stop",
        controller.daemon_pid().unwrap_or_default()
    );

    let mut line = String::new();
    // EOF on stdin also stops the daemon.
    let _ = std::io::stdin().lock().read_line(&mut line);

    controller.stop().context("failed to stop docker daemon")?;
    Ok(())
}
