//! Built-in command, step and agent tables.
//!
//! Built-ins are prompt files under the configured commands and agents
//! directories. Running one composes a prompt and hands it to the assistant.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use jdc::assistant::AssistantInvoker;
use jdc::config::Config;

use super::output;

#[derive(Debug, PartialEq)]
pub(crate) struct BuiltinCommand {
    pub name: &'static str,
    pub file: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

#[derive(Debug, PartialEq)]
pub(crate) struct BuiltinStep {
    pub name: &'static str,
    pub number: &'static str,
    pub description: &'static str,
}

#[derive(Debug, PartialEq)]
pub(crate) struct BuiltinAgent {
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

/// Shared by every step; holds the detailed step instructions.
pub(crate) const STEPS_FILE: &str = "dev-steps.md";

pub(crate) const COMMANDS: &[BuiltinCommand] = &[
    BuiltinCommand {
        name: "start",
        file: "start.md",
        description: "Start the development workflow",
        prompt: "Start the development workflow following start.md",
    },
    BuiltinCommand {
        name: "check",
        file: "check.md",
        description: "Check project status",
        prompt: "Check the project status following check.md",
    },
    BuiltinCommand {
        name: "progress",
        file: "progress.md",
        description: "Show progress",
        prompt: "Report project progress following progress.md",
    },
    BuiltinCommand {
        name: "next",
        file: "next.md",
        description: "Run the next step",
        prompt: "Run the next step following next.md",
    },
    BuiltinCommand {
        name: "reset",
        file: "reset.md",
        description: "Reset the project",
        prompt: "Reset the project status following reset.md",
    },
    BuiltinCommand {
        name: "init-docs",
        file: "init-docs.md",
        description: "Initialize documentation",
        prompt: "Initialize the project documentation following init-docs.md",
    },
    BuiltinCommand {
        name: "update-status",
        file: "update-status.md",
        description: "Update project status",
        prompt: "Update the project status following update-status.md",
    },
    BuiltinCommand {
        name: "update-todo",
        file: "update-todo.md",
        description: "Update the todo list",
        prompt: "Update the todo list following update-todo.md",
    },
    BuiltinCommand {
        name: "dependency-check",
        file: "dev-dependency-check.md",
        description: "Check step dependencies",
        prompt: "Check the prerequisites of the current step following dev-dependency-check.md",
    },
    BuiltinCommand {
        name: "dev",
        file: "dev.md",
        description: "Show the development workflow",
        prompt: "Walk through the complete development workflow in dev.md",
    },
    BuiltinCommand {
        name: "quick-start",
        file: "QUICK-START.md",
        description: "Quick start guide",
        prompt: "Guide me through getting started following QUICK-START.md",
    },
    BuiltinCommand {
        name: "faq",
        file: "dev-faq.md",
        description: "Frequently asked questions",
        prompt: "Answer common questions following dev-faq.md",
    },
    BuiltinCommand {
        name: "crud",
        file: "crud.md",
        description: "CRUD generation",
        prompt: "Perform the CRUD operation following crud.md",
    },
];

pub(crate) const STEPS: &[BuiltinStep] = &[
    BuiltinStep { name: "step1", number: "1", description: "Requirements clarification and analysis" },
    BuiltinStep { name: "step2", number: "2", description: "Technical design and module planning" },
    BuiltinStep { name: "step3", number: "3", description: "Git initialization" },
    BuiltinStep { name: "step4", number: "4", description: "Documentation initialization" },
    BuiltinStep { name: "step5", number: "5", description: "Database design" },
    BuiltinStep { name: "step5.5", number: "5.5", description: "Code generation approach" },
    BuiltinStep { name: "step6", number: "6", description: "Backend development" },
    BuiltinStep { name: "step7", number: "7", description: "Frontend development" },
    BuiltinStep { name: "step8", number: "8", description: "Testing and verification" },
    BuiltinStep { name: "step9", number: "9", description: "Code quality review" },
    BuiltinStep { name: "step10", number: "10", description: "Documentation update" },
    BuiltinStep { name: "step11", number: "11", description: "Git commit and merge" },
];

pub(crate) const AGENTS: &[BuiltinAgent] = &[
    BuiltinAgent {
        name: "requirements-analyst",
        description: "Requirements analyst",
        prompt: "Activate the requirements analyst agent",
    },
    BuiltinAgent {
        name: "code-generator",
        description: "Code generator",
        prompt: "Activate the code generator agent",
    },
    BuiltinAgent {
        name: "ui-generator",
        description: "UI generator",
        prompt: "Activate the UI generator agent",
    },
    BuiltinAgent {
        name: "test-engineer",
        description: "Test engineer",
        prompt: "Activate the test engineer agent",
    },
    BuiltinAgent {
        name: "quality-inspector",
        description: "Quality inspector",
        prompt: "Activate the quality inspector agent",
    },
    BuiltinAgent {
        name: "bug-detective",
        description: "Bug detective",
        prompt: "Activate the bug detective agent",
    },
    BuiltinAgent {
        name: "code-reviewer",
        description: "Code reviewer",
        prompt: "Activate the code reviewer agent",
    },
    BuiltinAgent {
        name: "git-workflow-manager",
        description: "Git workflow manager",
        prompt: "Activate the git workflow manager agent",
    },
    BuiltinAgent {
        name: "project-manager",
        description: "Project manager",
        prompt: "Activate the project manager agent",
    },
    BuiltinAgent {
        name: "deployment-assistant",
        description: "Deployment assistant",
        prompt: "Activate the deployment assistant agent",
    },
    BuiltinAgent {
        name: "release-manager",
        description: "Release manager",
        prompt: "Activate the release manager agent",
    },
];

pub(crate) fn find_command(name: &str) -> Option<&'static BuiltinCommand> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub(crate) fn find_step(name: &str) -> Option<&'static BuiltinStep> {
    STEPS.iter().find(|s| s.name == name)
}

pub(crate) fn find_agent(name: &str) -> Option<&'static BuiltinAgent> {
    AGENTS.iter().find(|a| a.name == name)
}

/// Prompt text from the arguments; `--` options are not part of it.
fn extra(args: &[String]) -> Option<String> {
    let words: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

impl BuiltinCommand {
    pub fn prompt(&self, args: &[String]) -> String {
        let mut prompt = self.prompt.to_string();
        if let Some(extra) = extra(args) {
            prompt.push_str(&format!("\n\nAdditional arguments: {}", extra));
        }
        prompt
    }
}

impl BuiltinStep {
    pub fn prompt(&self, args: &[String]) -> String {
        let mut prompt = format!(
            "Run step {} of the development workflow: {}",
            self.number, self.description
        );
        if let Some(extra) = extra(args) {
            prompt.push_str(&format!("\n\nAdditional information: {}", extra));
        }
        prompt.push_str(&format!(
            "\n\nFollow the detailed instructions for this step in {}.",
            STEPS_FILE
        ));
        prompt
    }
}

impl BuiltinAgent {
    /// Agent definitions live at `<agents_dir>/<name>/AGENT.md`.
    pub fn file(&self) -> PathBuf {
        Path::new(self.name).join("AGENT.md")
    }

    pub fn prompt(&self, args: &[String]) -> String {
        let mut prompt = self.prompt.to_string();
        if let Some(extra) = extra(args) {
            prompt.push_str(&format!("\n\nTask: {}", extra));
        }
        prompt
    }
}

/// Verify the prompt file, then print the prompt (`dry_run`) or run the assistant.
pub(crate) async fn run_prompt(
    config: &Config,
    required_file: &Path,
    prompt: &str,
    dry_run: bool,
) -> Result<()> {
    if !required_file.is_file() {
        bail!("Prompt file not found: {}", required_file.display());
    }

    if dry_run {
        output::info("Dry run: the assistant will not be invoked");
        println!("\nPrompt:\n{}\n", prompt);
        return Ok(());
    }

    let assistant = AssistantInvoker::from_config(config);
    output::info(&format!("Running {}...", assistant.command()));
    assistant.run(prompt).await?;
    output::success("Assistant finished");
    Ok(())
}
