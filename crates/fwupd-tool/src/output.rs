//! Output formatting for CLI responses

use anyhow::Error;
use colored::Colorize;
use serde_json::{Value, json};

use crate::error::exit_code;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": format!("{error:#}"),
            "exit_code": exit_code(error),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "Caused by:".yellow(), cause);
    }
}

/// Print a successful result as `{"success": true, ...}`
pub fn print_success_json(mut body: Value) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("success".to_owned(), Value::Bool(true));
    }
    match serde_json::to_string_pretty(&body) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format result as JSON: {e}"),
    }
}

/// Print a multi-line document without doubling its final newline
pub fn print_document(text: &str) {
    println!("{}", text.trim_end_matches('\n'));
}
