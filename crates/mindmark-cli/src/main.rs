mod buffer;
mod view;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use mindmark_config::{CommandSpec, Config, RenderSettings};
use mindmark_engine::parsing::{FenceBlock, canonicalize, scan_fences};
use mindmark_engine::render::{
    DiagramKind, DiagramRegistry, ImageSize, MemoryBlobStore, ProcessMathRenderer, ProcessRenderer,
    RenderOptions, RenderOrchestrator, RenderOutcome, SvgLineRasterizer,
};
use serde::Serialize;
use tokio::io::AsyncReadExt;

use buffer::Buffer;
use view::{JsonVisualization, embed_blobs};

#[derive(Parser)]
#[command(name = "mindmark")]
#[command(about = "Normalize loose markdown and render it as a mind-map tree")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.config/mindmark/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config with Graphviz and Mermaid renderers
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print the canonical form of a document
    Normalize {
        /// Markdown file; reads stdin when omitted
        file: Option<PathBuf>,
        /// Rewrite the file in place
        #[arg(short, long, requires = "file")]
        write: bool,
    },
    /// List fenced code blocks as JSON
    Fences {
        file: Option<PathBuf>,
    },
    /// Render the document and print the resulting tree as JSON
    Render {
        file: Option<PathBuf>,
        /// Inline rendered images as data URLs
        #[arg(long)]
        embed_images: bool,
        /// Flatten list items that mix text and inline math into one image
        #[arg(long)]
        flatten_math: bool,
        /// Rewrite the file in canonical form before rendering it
        #[arg(long, requires = "file")]
        autofix: bool,
    },
}

#[derive(Serialize)]
struct FenceSummary<'a> {
    start: usize,
    end: usize,
    indent: &'a str,
    marker: String,
    lang: &'a str,
    hint: Option<&'a str>,
    closed: bool,
    content: &'a str,
}

impl<'a> From<&'a FenceBlock> for FenceSummary<'a> {
    fn from(block: &'a FenceBlock) -> Self {
        Self {
            start: block.start,
            end: block.end,
            indent: &block.indent,
            marker: block.marker_char.as_char().to_string().repeat(block.marker_len),
            lang: &block.lang,
            hint: block.hint.as_deref(),
            closed: block.closed,
            content: &block.content,
        }
    }
}

fn starter_config() -> Config {
    let mut config = Config::default();
    config.renderers.insert(
        "dot".to_string(),
        CommandSpec {
            command: "dot".to_string(),
            args: vec!["-T{format}".to_string()],
        },
    );
    config.renderers.insert(
        "mermaid".to_string(),
        CommandSpec {
            command: "mmdc".to_string(),
            args: ["--input", "-", "--output", "-", "--outputFormat", "{format}"]
                .map(String::from)
                .to_vec(),
        },
    );
    config
}

fn init_config(path: Option<&Path>, force: bool) -> Result<PathBuf> {
    let target = path.map_or_else(Config::config_path, Path::to_path_buf);
    if target.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite it", target.display());
    }
    let config = starter_config();
    match path {
        Some(path) => config.save_to_path(path)?,
        None => config.save()?,
    }
    Ok(target)
}

fn render_options(settings: &RenderSettings) -> RenderOptions {
    RenderOptions {
        default_size: ImageSize::new(settings.default_width, settings.default_height),
        base_font_px: settings.base_font_px,
        flatten_math_lines: settings.flatten_math_lines,
        frame_interval: Duration::from_millis(settings.frame_interval_ms),
        ..RenderOptions::default()
    }
}

fn diagram_registry(config: &Config) -> DiagramRegistry {
    let mut registry = DiagramRegistry::new();
    for (alias, spec) in &config.renderers {
        match DiagramKind::from_lang(alias) {
            Some(kind) => {
                let renderer = ProcessRenderer::new(alias.as_str(), spec.command.as_str(), spec.args.clone());
                registry.register(kind, Arc::new(renderer));
            }
            None => warn!("Ignoring renderer for unknown diagram language '{alias}'"),
        }
    }
    registry
}

async fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let loaded = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(loaded.unwrap_or_else(|| {
        info!("No config file found; using defaults without renderers");
        Config::default()
    }))
}

async fn render(
    config: Config,
    text: String,
    autofix: Option<&Path>,
    embed_images: bool,
    flatten_math: bool,
) -> Result<()> {
    let mut options = render_options(&config.render);
    options.flatten_math_lines |= flatten_math;

    let store = Arc::new(MemoryBlobStore::new());
    let mut orchestrator = RenderOrchestrator::new(JsonVisualization::default(), store.clone())
        .with_options(options)
        .with_diagrams(diagram_registry(&config))
        .with_rasterizer(Arc::new(SvgLineRasterizer::new(config.render.base_font_px)));
    if let Some(math) = &config.math {
        orchestrator = orchestrator.with_math(Arc::new(ProcessMathRenderer::new(
            math.command.as_str(),
            math.args.clone(),
        )));
    }

    let buffer = Buffer::new(text);
    if let Some(path) = autofix {
        let canonical = orchestrator.normalize_for_editor(&buffer.text(), &buffer);
        tokio::fs::write(path, canonical)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Autofixed {}", path.display());
    }

    match orchestrator.render_from(&buffer).await? {
        RenderOutcome::Committed { images, .. } => {
            info!("Rendered tree with {images} images");
            let Some(mut tree) = orchestrator.visualization().await.take_tree() else {
                return Ok(());
            };
            if embed_images {
                embed_blobs(&mut tree, &store);
            }
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        RenderOutcome::Empty => info!("Nothing to render"),
        RenderOutcome::Superseded => warn!("Render was superseded"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            let path = init_config(cli.config.as_deref(), force)?;
            info!("Wrote {}", path.display());
        }
        Commands::Normalize { file, write } => {
            let text = canonicalize(&read_input(file.as_deref()).await?);

            match file.filter(|_| write) {
                Some(path) => {
                    tokio::fs::write(&path, text)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Normalized {}", path.display());
                }
                None => print!("{text}"),
            }
        }
        Commands::Fences { file } => {
            let text = read_input(file.as_deref()).await?;
            let blocks = scan_fences(&text);
            let summaries: Vec<FenceSummary<'_>> = blocks.iter().map(FenceSummary::from).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Render {
            file,
            embed_images,
            flatten_math,
            autofix,
        } => {
            let text = read_input(file.as_deref()).await?;
            let config = load_config(cli.config.as_deref())?;
            let autofix = file.as_deref().filter(|_| autofix);
            render(config, text, autofix, embed_images, flatten_math).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn settings_map_onto_render_options() {
        let settings = RenderSettings {
            default_width: 300,
            default_height: 100,
            base_font_px: 18.0,
            flatten_math_lines: true,
            frame_interval_ms: 5,
        };

        let options = render_options(&settings);

        assert_eq!(options.default_size, ImageSize::new(300, 100));
        assert_eq!(options.base_font_px, 18.0);
        assert!(options.flatten_math_lines);
        assert_eq!(options.frame_interval, Duration::from_millis(5));
        assert_eq!(options.math_fallback_size, RenderOptions::default().math_fallback_size);
    }

    #[test]
    fn registry_skips_unknown_languages() {
        let mut config = Config::default();
        for alias in ["graphviz", "plantuml"] {
            config.renderers.insert(
                alias.to_string(),
                CommandSpec {
                    command: "dot".to_string(),
                    args: vec!["-Tsvg".to_string()],
                },
            );
        }

        let registry = diagram_registry(&config);

        assert_eq!(registry.kinds().collect::<Vec<_>>(), [DiagramKind::Dot]);
        assert_eq!(registry.get(DiagramKind::Dot).unwrap().name(), "graphviz");
    }

    #[test]
    fn fence_summary_serializes_marker() {
        let blocks = scan_fences("~~~~dot png\na -> b\n~~~~");
        let json = serde_json::to_value(FenceSummary::from(&blocks[0])).unwrap();

        assert_eq!(json["marker"], "~~~~");
        assert_eq!(json["lang"], "dot");
        assert_eq!(json["hint"], "png");
        assert_eq!(json["content"], "a -> b");
        assert_eq!(json["closed"], true);
    }

    #[tokio::test]
    async fn autofix_rewrites_file_before_rendering() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        let text = "Notes\n\n- a\n\n- b\n";
        std::fs::write(&path, text).unwrap();

        render(Config::default(), text.to_string(), Some(path.as_path()), false, false)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#### Notes\n\n- a\n- b\n");
    }

    #[test]
    fn init_writes_loadable_starter_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mindmark/config.toml");

        assert_eq!(init_config(Some(path.as_path()), false).unwrap(), path);
        let config = load_config(Some(path.as_path())).unwrap();

        assert_eq!(config, starter_config());
        assert_eq!(
            diagram_registry(&config).kinds().collect::<Vec<_>>(),
            [DiagramKind::Mermaid, DiagramKind::Dot]
        );
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[render]\n").unwrap();

        let err = init_config(Some(path.as_path()), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[render]\n");

        init_config(Some(path.as_path()), true).unwrap();
        assert_eq!(load_config(Some(path.as_path())).unwrap(), starter_config());
    }

    #[test]
    fn missing_explicit_config_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config, Config::default());
    }
}
