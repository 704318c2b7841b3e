use clap::{Parser, Subcommand};
use ctxedit::config::Config;
use ctxedit::richtext::markdown_converter::{markdown_to_tree, tree_to_markdown};
use ctxedit::richtext::markup;
use ctxedit::richtext::{DocumentPosition, StructuredEditor};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ctxedit")]
#[command(about = "Toggle inline formats on rich text documents", long_about = None)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Toggle one or more formats on a selection and print the result
    Toggle {
        /// Format key to toggle, applied in order
        #[arg(short = 'f', long = "format", required = true)]
        formats: Vec<String>,

        /// Selection start as BLOCK:OFFSET
        #[arg(long, value_parser = parse_position)]
        from: Option<DocumentPosition>,

        /// Selection end as BLOCK:OFFSET
        #[arg(long, value_parser = parse_position)]
        to: Option<DocumentPosition>,

        /// Read markup (with optional selection markers) instead of Markdown
        #[arg(long)]
        markup: bool,

        /// Print Markdown instead of markup
        #[arg(long)]
        markdown_out: bool,

        /// Input file, or stdin when absent or "-"
        input: Option<PathBuf>,
    },
    /// List the registered format keys
    Formats,
}

fn parse_position(value: &str) -> Result<DocumentPosition, String> {
    let (block, offset) = value
        .split_once(':')
        .ok_or_else(|| format!("expected BLOCK:OFFSET, got '{}'", value))?;
    let block = block
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad block index '{}': {}", block, e))?;
    let offset = offset
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad offset '{}': {}", offset, e))?;
    Ok(DocumentPosition::new(block, offset))
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => Config::load_from(path).map_err(|e| e.to_string()),
        None => Ok(Config::load()),
    }
}

fn read_input(input: Option<&Path>) -> Result<String, String> {
    match input {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            Ok(buffer)
        }
    }
}

struct ToggleRequest {
    formats: Vec<String>,
    from: Option<DocumentPosition>,
    to: Option<DocumentPosition>,
    markup: bool,
    markdown_out: bool,
    input: Option<PathBuf>,
}

fn cmd_toggle(request: ToggleRequest, config: &Config) -> Result<(), String> {
    let source = read_input(request.input.as_deref())?;

    let (tree, marked) = if request.markup {
        markup::parse(&source)
            .and_then(|m| m.into_document())
            .map_err(|e| e.to_string())?
    } else {
        (markdown_to_tree(&source), None)
    };

    let mut editor = StructuredEditor::with_config(tree, config).map_err(|e| e.to_string())?;

    let selection = match (request.from, request.to) {
        (Some(from), Some(to)) => Some((from, to)),
        (Some(at), None) | (None, Some(at)) => Some((at, at)),
        (None, None) => marked,
    };
    if let Some((start, end)) = selection {
        editor.set_selection(start, end).map_err(|e| e.to_string())?;
    }

    for key in &request.formats {
        let outcome = editor.toggle(key).map_err(|e| format!("{}: {}", key, e))?;
        log::info!(
            "{}: {:?} over {} fragment(s)",
            key,
            outcome.action,
            outcome.fragments
        );
    }

    if request.markdown_out {
        println!("{}", tree_to_markdown(editor.tree()));
    } else {
        println!("{}", editor.to_markup());
    }
    Ok(())
}

fn cmd_formats(config: &Config) -> Result<(), String> {
    let registry = config.registry().map_err(|e| e.to_string())?;
    let width = registry.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, format) in registry.iter() {
        println!("  {:<width$}  <{}>", key, format, width = width);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let args = Args::parse();

    let result = load_config(args.config.as_deref()).and_then(|config| match args.command {
        Commands::Toggle {
            formats,
            from,
            to,
            markup,
            markdown_out,
            input,
        } => cmd_toggle(
            ToggleRequest {
                formats,
                from,
                to,
                markup,
                markdown_out,
                input,
            },
            &config,
        ),
        Commands::Formats => cmd_formats(&config),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
