// Quill - multi-agent chapter writing pipeline
// Main entry point

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quill::config::{load_config, Config};
use quill::events::{EventDispatcher, EventSink, JsonlEventSink, TracingEventSink};
use quill::generators::OllamaGenerator;
use quill::logging::init_tracing;
use quill::pipeline::{Assignment, ChapterPipeline, PipelineOutcome, ProjectMaterials};
use quill::store::{SqliteStore, Store};

#[derive(Parser)]
#[command(name = "quill", version, about = "Draft, critique and revise book chapters with local models")]
struct Cli {
    /// Path to config file (defaults to ~/.quill/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a chapter: draft, evaluate and revise until accepted
    Write {
        #[command(flatten)]
        target: ChapterArgs,

        /// Book outline file
        #[arg(long)]
        outline: PathBuf,

        /// Outline for this chapter (defaults to its section of the book outline)
        #[arg(long)]
        chapter_outline: Option<PathBuf>,

        #[arg(long)]
        title: Option<String>,

        /// Target length in words
        #[arg(long)]
        words: Option<usize>,

        #[command(flatten)]
        materials: MaterialArgs,
    },
    /// Score the current version of a chapter
    Critique {
        #[command(flatten)]
        target: ChapterArgs,

        #[command(flatten)]
        materials: MaterialArgs,
    },
    /// Run one more revision cycle on a finished chapter
    Revise {
        #[command(flatten)]
        target: ChapterArgs,

        /// Extra notes for the reviser
        #[arg(long, default_value = "")]
        notes: String,

        #[command(flatten)]
        materials: MaterialArgs,
    },
    /// Show chapter status for a project
    Status {
        #[arg(long)]
        project: String,
    },
    /// List live summaries for a project
    Summaries {
        #[arg(long)]
        project: String,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct ChapterArgs {
    #[arg(long)]
    project: String,

    #[arg(long)]
    chapter: u32,
}

#[derive(Args, Default)]
struct MaterialArgs {
    /// Style guide file
    #[arg(long)]
    style: Option<PathBuf>,

    /// Story bible file (characters, places, rules)
    #[arg(long)]
    bible: Option<PathBuf>,

    /// Reference excerpt whose voice the style editor should match
    #[arg(long)]
    reference: Option<PathBuf>,
}

impl MaterialArgs {
    fn load(&self, project_outline: Option<String>) -> Result<ProjectMaterials> {
        Ok(ProjectMaterials {
            project_outline,
            style_guide: read_optional(self.style.as_deref())?,
            reference_excerpt: read_optional(self.reference.as_deref())?,
            story_bible: read_optional(self.bible.as_deref())?,
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>> {
    path.map(read_file).transpose()
}

/// Section of a book outline under a "Chapter N" heading, if there is one
fn chapter_section(outline: &str, chapter: u32) -> Option<String> {
    let is_heading = |line: &str| {
        let line = line.trim_start_matches('#').trim().to_lowercase();
        line.strip_prefix("chapter ").map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
    };

    let mut section = Vec::new();
    let mut inside = false;
    for line in outline.lines() {
        match is_heading(line) {
            Some(number) if !number.is_empty() => {
                if inside {
                    break;
                }
                inside = number.parse::<u32>().ok() == Some(chapter);
                if inside {
                    section.push(line);
                }
            }
            _ if inside => section.push(line),
            _ => {}
        }
    }
    let text = section.join("\n").trim().to_string();
    (!text.is_empty()).then_some(text)
}

struct App {
    config: Config,
    store: Arc<dyn Store>,
    events: Arc<EventDispatcher>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.store.path)
            .with_context(|| format!("Failed to open store at {}", config.store.path.display()))?;

        let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingEventSink)];
        if let Some(path) = &config.logging.event_log {
            sinks.push(Arc::new(JsonlEventSink::new(path.clone())?));
        }

        Ok(Self {
            config,
            store: Arc::new(store),
            events: Arc::new(EventDispatcher::new(sinks)),
        })
    }

    fn pipeline(&self) -> Result<ChapterPipeline> {
        let generator = OllamaGenerator::new(self.config.llm.clone(), self.config.roles.clone())
            .context("Failed to create Ollama generator")?;
        Ok(
            ChapterPipeline::new(self.config.clone(), Arc::new(generator), self.store.clone())
                .with_events(self.events.clone()),
        )
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    let chapter = &outcome.chapter;
    println!(
        "Chapter {} v{}: {} words, score {:.1}/10 after {} revision(s)",
        chapter.chapter_number,
        chapter.version,
        chapter.word_count,
        outcome.final_score.overall_score,
        outcome.iterations
    );
    if let Some(error) = &chapter.last_error {
        println!("Needs review: revision stopped early ({}: {})", error.kind, error.message);
    } else if outcome.needs_review() {
        println!(
            "Needs review: revision budget exhausted (priority {})",
            outcome.final_score.priority
        );
    }
    for stage in &outcome.last_edit {
        match &stage.error {
            Some(e) => println!("  {}: skipped ({e})", stage.kind),
            None => println!("  {}: {} change(s)", stage.kind, stage.changes.len()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    let app = App::open(config)?;
    let result = run(&app, cli.command).await;
    app.events.shutdown().await;
    result
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Write {
            target,
            outline,
            chapter_outline,
            title,
            words,
            materials,
        } => {
            let book = read_file(&outline)?;
            let chapter_outline = match chapter_outline {
                Some(path) => read_file(&path)?,
                None => chapter_section(&book, target.chapter).unwrap_or_else(|| book.clone()),
            };
            let assignment = Assignment {
                title,
                target_word_count: words,
                ..Assignment::new(target.project, target.chapter, chapter_outline)
            };
            let materials = materials.load(Some(book))?;
            let outcome = app.pipeline()?.write(&assignment, &materials).await?;
            print_outcome(&outcome);
        }
        Command::Critique { target, materials } => {
            let materials = materials.load(None)?;
            let score = app
                .pipeline()?
                .critique(&target.project, target.chapter, &materials)
                .await?;
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        Command::Revise {
            target,
            notes,
            materials,
        } => {
            let materials = materials.load(None)?;
            let outcome = app
                .pipeline()?
                .revise(&target.project, target.chapter, &notes, &materials)
                .await?;
            print_outcome(&outcome);
        }
        Command::Status { project } => {
            let chapters = app.store.list_chapters(&project).await?;
            if chapters.is_empty() {
                println!("No chapters for project '{project}'");
            }
            for chapter in chapters {
                let mut line = format!(
                    "{:>3}  {:<10} v{:<3} {:>6} words",
                    chapter.chapter_number, chapter.status.as_str(), chapter.version, chapter.word_count
                );
                if chapter.needs_review {
                    line.push_str("  [needs review]");
                }
                if let Some(error) = &chapter.last_error {
                    line.push_str(&format!("  {}: {}", error.kind, error.message));
                }
                println!("{line}");
            }
        }
        Command::Summaries { project } => {
            let summaries = app.pipeline()?.compression().live_summaries(&project).await?;
            if summaries.is_empty() {
                println!("No summaries for project '{project}'");
            }
            for summary in summaries {
                println!(
                    "{} {} ({} → {} words)\n{}\n",
                    summary.range,
                    if summary.is_meta() { "meta" } else { "summary" },
                    summary.source_word_count,
                    summary.summary_word_count,
                    summary.text
                );
            }
        }
        Command::Config => {}
    }
    Ok(())
}
