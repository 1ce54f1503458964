//
// main.rs
//
// Command-line entry point
//

use std::env;

use rfls::backend;

fn print_usage() {
    println!("rfls {}, a Robot Framework language server.", env!("CARGO_PKG_VERSION"));
    print!(
        r#"
Usage: rfls [OPTIONS]

Available options:

--stdio                      Start the LSP server using stdio transport
--version                    Print the version
--help                       Print this help message

Logging is controlled with RUST_LOG, timing output with RFLS_PERF=1|verbose.

"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut use_stdio = false;

    for arg in argv {
        match arg.as_str() {
            "--stdio" => use_stdio = true,
            "--version" => {
                println!("rfls {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("Unknown argument: '{other}'"));
            }
        }
    }

    if !use_stdio {
        print_usage();
        return Ok(());
    }

    env_logger::init();

    backend::start_lsp().await
}
