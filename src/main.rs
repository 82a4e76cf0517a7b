use color_eyre::eyre::{Result, WrapErr, eyre};
use httptests::compose;
use httptests::patch;
use httptests::{
    DriverConfig, ProbeConfig, SuiteConfig, SuiteRunner, UpstreamConfig, UpstreamServer,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("httptests=info")
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Default to running a suite if no command is specified
    let command = args.get(1).map(String::as_str).unwrap_or("run");

    match command {
        "run" => {
            let spec_path = args
                .get(2)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("example/.httptests/test.json"));
            let target: SocketAddr = match args.get(3) {
                Some(raw) => raw
                    .parse()
                    .wrap_err_with(|| format!("invalid target address {raw:?}"))?,
                None => "127.0.0.1:80".parse().unwrap(),
            };

            let config = SuiteConfig {
                probe: ProbeConfig {
                    target,
                    ..Default::default()
                },
                driver: DriverConfig {
                    base_addr: target,
                    ..Default::default()
                },
            };

            info!(spec = %spec_path.display(), %target, "Starting suite run");
            let summary = SuiteRunner::new(config)
                .run(&spec_path)
                .await
                .wrap_err("Suite run failed")?;
            if !summary.is_success() {
                std::process::exit(summary.exit_code());
            }
        }
        "mock" => {
            let port = args
                .get(2)
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(5001);

            let config = UpstreamConfig {
                bind_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
                ..Default::default()
            };
            let server = UpstreamServer::new(config.clone());
            info!(address = %config.bind_addr, "Starting mock upstream");
            server.run().await.wrap_err("Failed to run mock upstream")?;
        }
        "patch-headers" => {
            let mut dry_run = false;
            let mut file: Option<PathBuf> = None;
            let mut dir = PathBuf::from(".");
            let mut rest = args.iter().skip(2);
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--dry-run" => dry_run = true,
                    "--file" => {
                        let path = rest.next().ok_or_else(|| eyre!("--file requires a path"))?;
                        file = Some(PathBuf::from(path));
                    }
                    other => dir = PathBuf::from(other),
                }
            }

            let changes = match file {
                Some(file) => patch::patch_file(&file, dry_run)
                    .wrap_err_with(|| format!("failed to patch {}", file.display()))?,
                None => patch::patch_tree(&dir, dry_run)
                    .wrap_err_with(|| format!("failed to patch files under {}", dir.display()))?,
            };
            info!(changes, dry_run, "Header patching complete");
        }
        "gen-compose" => {
            let suite = args
                .get(2)
                .ok_or_else(|| eyre!("gen-compose requires a suite directory"))?;
            let output = args
                .get(3)
                .ok_or_else(|| eyre!("gen-compose requires an output path"))?;

            let compose_file = compose::generate(Path::new(suite))
                .wrap_err("Failed to generate compose file")?;
            compose::write(&compose_file, Path::new(output))
                .wrap_err("Failed to write compose file")?;
        }
        _ => {
            eprintln!(
                "Usage: {} [run|mock|patch-headers|gen-compose] ...",
                args[0]
            );
            eprintln!("  run [spec.json] [addr]            Run a test suite against a target (default addr 127.0.0.1:80)");
            eprintln!("  mock [port]                       Start the mock echo upstream (default port 5001)");
            eprintln!("  patch-headers [dir] [--file f] [--dry-run]");
            eprintln!("                                    Insert X-Upstream-Target directives into .conf files");
            eprintln!("  gen-compose <suite> <output>      Generate docker-compose.yml for a suite directory");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  {} run example/.httptests/test.json", args[0]);
            eprintln!("  {} run tests.json 127.0.0.1:8080", args[0]);
            eprintln!("  {} mock 5001", args[0]);
            eprintln!("  {} patch-headers example --dry-run", args[0]);
            eprintln!(
                "  {} gen-compose example/.httptests example/.httptests/docker-compose.yml",
                args[0]
            );
            std::process::exit(2);
        }
    }

    Ok(())
}
