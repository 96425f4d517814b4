use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gecko_codec::{decode_with, describe_tree, encode_all, DecodeOptions, Instruction};

mod model;
use model::{load_code_list, InputFormat};

#[derive(Parser, Debug)]
#[command(author, version, about = "Gecko code list dumper", long_about = None)]
struct Cli {
    /// Input code list: raw bytes, a .gct file or hex text
    #[arg(value_name = "FILE")]
    input: String,
    #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
    format: InputFormat,
    /// Skip N bytes of code list (after any GCT header)
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Limit bytes decoded (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// Deepest block nesting accepted
    #[arg(long, default_value_t = DecodeOptions::default().max_depth)]
    max_depth: usize,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-encode every code and print it as hex, each preceded by its description
    Hex {
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
    /// Print the indented human-readable listing
    Describe,
    /// Dump the decoded tree as JSON
    Json {
        #[arg(long)]
        pretty: bool,
        #[arg(long, value_name = "FILE")]
        out: Option<String>,
    },
    /// Decode, re-encode and compare against the input
    Check,
}

fn emit(out: Option<String>, text: String) -> Result<()> {
    match out {
        Some(path) => std::fs::write(&path, text).with_context(|| format!("writing {path}")),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn hex_listing(codes: &[Instruction]) -> Result<String> {
    let mut buf = String::new();
    for code in codes {
        let _ = writeln!(buf, "* {code}");
        let _ = writeln!(buf, "{}", code.as_text()?);
    }
    Ok(buf)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let list = load_code_list(Path::new(&cli.input), cli.format, cli.skip, cli.len)?;
    info!(bytes = list.bytes.len(), header = list.had_header, "loaded code list");

    let opts = DecodeOptions { max_depth: cli.max_depth };
    let codes = decode_with(&list.bytes, &opts).with_context(|| format!("decoding {}", cli.input))?;

    match cli.cmd {
        Command::Hex { out } => emit(out, hex_listing(&codes)?)?,
        Command::Describe => print!("{}", describe_tree(&codes)),
        Command::Json { pretty, out } => {
            let mut json = if pretty { serde_json::to_string_pretty(&codes)? } else { serde_json::to_string(&codes)? };
            json.push('\n');
            emit(out, json)?;
        }
        Command::Check => {
            let bytes = encode_all(&codes)?;
            anyhow::ensure!(
                bytes == list.bytes,
                "re-encoded list differs: {} bytes in, {} bytes out",
                list.bytes.len(),
                bytes.len()
            );
            println!("ok: {} codes, {} bytes", codes.len(), bytes.len());
        }
    }
    Ok(())
}
