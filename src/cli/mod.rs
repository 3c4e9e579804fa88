//! CLI command handling
//!
//! Dispatches CLI commands to the scenario library and formats output.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde_json::Value;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::logging::{LogCategory, TracingSink};
use crate::common::{Error, Result};
use crate::driver::DryRunFactory;
use crate::persist;
use crate::runner::{RunEvent, Runner};
use crate::scenario::{Scenario, ScenarioSettings};
use crate::tree::{NodeId, NodeRegistry, TestCaseResult, Tree};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    let registry = NodeRegistry::with_builtin();

    match command {
        Commands::New {
            file,
            name,
            url,
            browser,
        } => {
            let name = name.unwrap_or_else(|| file_stem(&file));
            let settings = ScenarioSettings {
                browser: browser.unwrap_or(config.defaults.browser),
                url,
            };
            let scenario = Scenario::new(name, settings);
            persist::save_scenario(&scenario, &file)?;
            println!("Created scenario {}", file.display().to_string().bold());
            Ok(())
        }

        Commands::Add {
            file,
            node_type,
            parent,
            index,
            properties,
        } => {
            let mut scenario = open(&file, &registry, config)?;
            let mut node = registry
                .create(&node_type)
                .ok_or_else(|| Error::UnknownNodeKind(node_type.clone()))?;
            for assignment in &properties {
                let (name, value) = assignment.split_once('=').ok_or_else(|| {
                    Error::invalid_property(assignment, "expected <name>=<value>")
                })?;
                node.set_property(name, parse_value(value))?;
            }

            let parent = parent.map(NodeId).unwrap_or_else(|| scenario.root());
            let id = scenario.add_child(parent, node, index)?;
            persist::save_scenario(&scenario, &file)?;
            println!("{} Added node {}", "✓".green(), id.to_string().bold());
            Ok(())
        }

        Commands::Set {
            file,
            node,
            property,
            value,
        } => {
            let mut scenario = open(&file, &registry, config)?;
            scenario.set_property(NodeId(node), &property, parse_value(&value))?;
            persist::save_scenario(&scenario, &file)?;
            println!("{} {} updated on {}", "✓".green(), property, NodeId(node));
            Ok(())
        }

        Commands::Remove { file, node } => {
            let mut scenario = open(&file, &registry, config)?;
            let id = NodeId(node);
            let parent = scenario
                .tree()
                .node(id)?
                .parent()
                .ok_or(Error::CannotRemoveRoot)?;
            scenario.remove_child(parent, id)?;
            persist::save_scenario(&scenario, &file)?;
            println!("{} Removed node {}", "✓".green(), id);
            Ok(())
        }

        Commands::Show { file } => {
            let scenario = open(&file, &registry, config)?;
            print_header(&scenario);
            print_tree(scenario.tree(), false);
            Ok(())
        }

        Commands::Nodes => {
            let mut factories: Vec<_> = registry.factories().collect();
            factories.sort_by_key(|f| (f.category, f.id));
            let mut category = "";
            for factory in factories {
                if factory.category != category {
                    category = factory.category;
                    println!("{}", format!("{}:", category).cyan());
                }
                println!(
                    "  {:<18} {}",
                    factory.id.bold(),
                    factory.description.dimmed()
                );
            }
            Ok(())
        }

        Commands::Run {
            file,
            browser,
            results_dir,
        } => {
            let mut scenario = open(&file, &registry, config)?;
            if let Some(browser) = browser {
                scenario.set_browser(browser)?;
            }

            let mut runner_config = config.runner.clone();
            if results_dir.is_some() {
                runner_config.results_dir = results_dir;
            }
            let runner = Runner::new(Arc::new(DryRunFactory::new()), runner_config)
                .with_sink(Arc::new(TracingSink))
                .with_registry(registry);
            let mut events = runner.subscribe();

            println!(
                "{} {}",
                "Running scenario:".blue().bold(),
                scenario.name().white().bold()
            );
            let handle = runner.initialize(&scenario).ok_or(Error::AlreadyRunning)?;
            let model = handle.wait().await?;

            while let Ok(event) = events.try_recv() {
                if let RunEvent::Started(status) = event {
                    if let Some(id) = status.unique_id {
                        println!("  Run id: {}", id.dimmed());
                    }
                }
            }

            print_tree(model.tree(), true);
            if let Some(folder) = runner.run_folder() {
                println!("\nResults: {}", folder.display().to_string().dimmed());
            }

            let outcome = model.outcome();
            print_outcome(outcome);
            if outcome == TestCaseResult::Failed {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Result { file } => {
            let model = persist::open_result(&file, &registry)?;
            print_header(model.scenario());
            print_tree(model.tree(), true);
            print_outcome(model.outcome());
            Ok(())
        }
    }
}

fn open(path: &Path, registry: &NodeRegistry, config: &Config) -> Result<Scenario> {
    let scenario = persist::open_scenario(path, registry)?;
    Ok(scenario.with_history_limit(config.editor.history_limit))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Scenario")
        .to_string()
}

/// JSON if it parses, otherwise the raw text as a string
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn print_header(scenario: &Scenario) {
    let settings = scenario.settings();
    println!("{}", scenario.name().white().bold());
    println!("  Browser: {}", settings.browser.to_string().dimmed());
    if let Some(url) = &settings.url {
        println!("  URL: {}", url.dimmed());
    }
    println!();
}

fn print_tree(tree: &Tree, with_results: bool) {
    for id in tree.walk() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        let indent = "  ".repeat(tree.depth(id));
        let marker = if with_results {
            match node.actual_result {
                TestCaseResult::Passed => "✓".green(),
                TestCaseResult::Failed => "✗".red(),
                TestCaseResult::NotRun => "-".dimmed(),
            }
        } else {
            "•".normal()
        };
        let mut line = format!(
            "{}{} {} {} {}",
            indent,
            marker,
            id.to_string().dimmed(),
            node.description,
            format!("[{}]", node.kind.name()).dimmed()
        );
        if !node.marked_for_execution {
            line.push_str(&format!(" {}", "(disabled)".yellow()));
        }
        println!("{}", line);

        if with_results {
            for entry in &node.log {
                for part in entry.message.lines() {
                    let part = match entry.category {
                        LogCategory::Exception => part.red(),
                        LogCategory::Warn => part.yellow(),
                        LogCategory::Info => part.dimmed(),
                    };
                    println!("{}    {}", indent, part);
                }
            }
        }
    }
}

fn print_outcome(outcome: TestCaseResult) {
    match outcome {
        TestCaseResult::Passed => {
            println!("\n{} {}", "✓".green().bold(), "Passed".green().bold())
        }
        TestCaseResult::Failed => {
            println!("\n{} {}", "✗".red().bold(), "Failed".red().bold())
        }
        TestCaseResult::NotRun => println!("\n{}", "Nothing was run".yellow()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("3"), json!(3));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("https://example.com"), json!("https://example.com"));
    }

    #[test]
    fn test_file_stem_names_scenario() {
        assert_eq!(file_stem(Path::new("/tmp/login.wts")), "login");
    }
}
