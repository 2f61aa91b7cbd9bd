//! examgrade CLI: grade language models on multiple-choice exams.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "examgrade",
    version,
    about = "Grade LLMs on multiple-choice exams"
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "EXAMGRADE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an exam file is well formed
    Check {
        /// Path to the exam text file
        #[arg(long)]
        file: PathBuf,
    },

    /// Import an exam file into the database
    Import {
        /// Path to the exam text file
        #[arg(long)]
        file: PathBuf,

        /// Course (subject) the exam belongs to
        #[arg(long)]
        course: String,

        /// Exam name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// User owning the course
        #[arg(long)]
        owner: Option<String>,
    },

    /// Evaluate one model on one exam, streaming progress events
    Run {
        /// Exam id
        #[arg(long)]
        exam: i64,

        /// Model to evaluate (defaults to the configured local model)
        #[arg(long)]
        model: Option<String>,

        /// Instruction placed before every question
        #[arg(long, default_value = "")]
        instruction: String,
    },

    /// Evaluate every model on every exam, several times
    Batch {
        /// Exam ids (comma-separated)
        #[arg(long)]
        exams: String,

        /// Models (comma-separated, defaults to the configured local model)
        #[arg(long)]
        models: Option<String>,

        /// Repetitions per model and exam
        #[arg(long, default_value = "1")]
        repetitions: usize,

        /// Instruction placed before every question
        #[arg(long, default_value = "")]
        instruction: String,
    },

    /// Show the stored evaluations of an exam
    History {
        /// Exam id
        #[arg(long)]
        exam: i64,
    },

    /// Average grade and time per model, by course and overall
    Analysis {
        /// Only this course
        #[arg(long, conflicts_with = "exam")]
        course: Option<String>,

        /// Only this exam id
        #[arg(long)]
        exam: Option<i64>,
    },

    /// List available models
    Models,

    /// Create starter config and example exam
    Init,
}

#[tokio::main]
async fn main() {
    // stdout carries the event stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examgrade=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Check { file } => commands::check::execute(file),
        Commands::Import {
            file,
            course,
            name,
            owner,
        } => commands::import::execute(file, course, name, owner, config),
        Commands::Run {
            exam,
            model,
            instruction,
        } => commands::run::execute(exam, model, instruction, config).await,
        Commands::Batch {
            exams,
            models,
            repetitions,
            instruction,
        } => commands::batch::execute(exams, models, repetitions, instruction, config).await,
        Commands::History { exam } => commands::history::execute(exam, config),
        Commands::Analysis { course, exam } => commands::analysis::execute(course, exam, config),
        Commands::Models => commands::models::execute(config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
