//! The `examgrade init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create examgrade.toml
    if std::path::Path::new("examgrade.toml").exists() {
        println!("examgrade.toml already exists, skipping.");
    } else {
        std::fs::write("examgrade.toml", SAMPLE_CONFIG)?;
        println!("Created examgrade.toml");
    }

    // Create example exam
    std::fs::create_dir_all("exams")?;
    let example_path = std::path::Path::new("exams/example.txt");
    if example_path.exists() {
        println!("exams/example.txt already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_EXAM)?;
        println!("Created exams/example.txt");
    }

    println!("\nNext steps:");
    println!("  1. Edit examgrade.toml with your external models, if any");
    println!("  2. Run: examgrade check --file exams/example.txt");
    println!("  3. Run: examgrade import --file exams/example.txt --course \"Operating Systems\"");
    println!("  4. Run: examgrade run --exam 1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examgrade configuration

ollama_url = "http://localhost:11434"
database = "./examgrade.db"
default_model = "llama3.2:1b"
request_timeout_secs = 300

# External models speak the OpenAI chat completions API.
# [[models]]
# description = "gpt-4.1-mini"
# api_url = "https://api.openai.com/v1"
# api_key = "${OPENAI_API_KEY}"
# owner = "you"
"#;

const EXAMPLE_EXAM: &str = "\
What's the PATH?
a) A special file.
b) An environment variable.
c) A shell builtin.

b

Which signal cannot be caught?
a) SIGTERM
b) SIGINT
c) SIGKILL

c

What does `chmod 644 file` grant the owner?
a) Read and write.
b) Read only.
c) Read, write and execute.

a
";
