use chatmark_core::theme::Theme;
use chatmark_markdown::MessageStream;
use chatmark_markdown::RenderOptions;
use chatmark_markdown::layout::LayoutOptions;
use chatmark_markdown::layout::TableStyle;
use chatmark_markdown::layout::text_plain;
use std::env;
use std::fs;
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut layout = LayoutOptions::default();
    let mut render = RenderOptions::default();
    let mut stream_chunk: Option<usize> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--width" => {
                layout.width = parse_num(&args, &mut i, "--width")?;
            }
            "--show-link-destinations" => {
                layout.show_link_destinations = true;
                i += 1;
            }
            "--expand-annotations" => {
                layout.expand_annotations = true;
                i += 1;
            }
            "--preserve-new-lines" => {
                render.preserve_new_lines = true;
                i += 1;
            }
            "--base-url" => {
                render.base_url = Some(parse_string(&args, &mut i, "--base-url")?);
            }
            "--table-style" => {
                let v = parse_string(&args, &mut i, "--table-style")?;
                layout.table_style = match v.as_str() {
                    "glow" => TableStyle::Glow,
                    "box" => TableStyle::Box,
                    other => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("unknown table style: {other}"),
                        ));
                    }
                };
            }
            "--stream" => {
                stream_chunk = Some(parse_num(&args, &mut i, "--stream")?);
            }
            _ => break,
        }
    }

    let input = if i < args.len() {
        fs::read_to_string(&args[i])?
    } else {
        let mut s = String::new();
        io::stdin().read_to_string(&mut s)?;
        s
    };

    let mut stream = MessageStream::new(render);
    match stream_chunk {
        Some(n) => {
            let chars: Vec<char> = input.chars().collect();
            for chunk in chars.chunks(n.max(1)) {
                let delta: String = chunk.iter().collect();
                let rendered = stream.append(&delta);
                tracing::debug!(
                    blocks = rendered.blocks().len(),
                    generation = rendered.generation(),
                    "streamed delta"
                );
            }
        }
        None => {
            stream.append(&input);
        }
    }
    stream.finalize();

    let theme = Theme::default();
    let text = stream.rendered().to_text(&theme, &layout);
    println!("{}", text_plain(&text));
    println!("\n--- copy ---\n{}", stream.copy_text());
    println!("\n--- speech ---\n{}", stream.speech_text());

    Ok(())
}

fn print_help() {
    eprintln!(
        "Usage: dump [options] [path]\n\
\n\
Options:\n\
  --width <n>                 Wrap width (default: 80)\n\
  --stream <n>                Replay the input as deltas of n characters\n\
  --show-link-destinations    Show (url) after link text\n\
  --expand-annotations        Show reasoning/tool-call bodies\n\
  --preserve-new-lines        Render soft breaks as line breaks\n\
  --base-url <url>            Resolve relative links/images against this base\n\
  --table-style <glow|box>    Table rendering style (default: glow)\n\
  -h, --help                  Show this help\n\
\n\
If [path] is omitted, reads the message from stdin.\n\
Set RUST_LOG=chatmark_markdown=trace to see per-pass diagnostics."
    );
}

fn parse_num<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> io::Result<T>
where
    T::Err: std::fmt::Display,
{
    let v = parse_string(args, i, flag)?;
    v.parse::<T>().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{flag} invalid number: {e}"),
        )
    })
}

fn parse_string(args: &[String], i: &mut usize, flag: &str) -> io::Result<String> {
    let Some(v) = args.get(*i + 1) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{flag} expects a value"),
        ));
    };
    *i += 2;
    Ok(v.to_string())
}
