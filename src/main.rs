use clap::Parser;
use nl_recall::assistant::Assistant;
use nl_recall::config::{AppConfig, CliArgs};
use nl_recall::db::executor::QueryTable;
use nl_recall::util::logging::init_tracing;
use serde_json::Value;
use tracing::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let assistant = match Assistant::from_config(&config).await {
        Ok(assistant) => assistant,
        Err(e) => {
            error!("Failed to start assistant: {}", e);
            return Err(e.into());
        }
    };

    let answer = assistant.answer(&args.question).await?;

    if !answer.similar.is_empty() {
        println!("Similar past questions:");
        for similar in &answer.similar {
            println!("  - {}  =>  {}", similar.natural_query, similar.sql_query);
        }
        println!();
    }

    print_table(&answer.table);
    println!("({} rows)", answer.table.row_count());

    Ok(())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_table(table: &QueryTable) {
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.len()).collect();
    let rendered: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            if cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let header: Vec<String> = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
        .collect();
    println!("{}", header.join(" | "));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));

    for row in &rendered {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        println!("{}", line.join(" | "));
    }
}
