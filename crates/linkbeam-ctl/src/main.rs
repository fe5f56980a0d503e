//! linkbeam-ctl: command-line interface for the LinkBeam daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::{files, status, transfers};

const DEFAULT_PORT: u16 = 5000;

fn print_usage() {
    println!("Usage: linkbeam-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                          Show node identity and counters");
    println!("  peers                           List discovered peers");
    println!("  files                           List received files");
    println!("  transfers                       List outbound transfers");
    println!("  send <path> --peer <device_id>  Send a file and wait for it to finish");
    println!("  abort <transfer_id>             Abort an in-flight send");
    println!("  download <filename> [--out <path>]");
    println!("                                  Download a received file");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["peers"] => status::cmd_peers(port).await,
        ["files"] => files::cmd_files(port).await,
        ["transfers"] => transfers::cmd_transfers(port).await,
        ["send", path, "--peer", peer] | ["send", "--peer", peer, path] => {
            transfers::cmd_send(port, path, peer).await
        }
        ["abort", id] => transfers::cmd_abort(port, id).await,
        ["download", name] => files::cmd_download(port, name, None).await,
        ["download", name, "--out", out] => files::cmd_download(port, name, Some(out)).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
