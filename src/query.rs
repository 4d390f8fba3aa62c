//! `prag query`: answer a request from the command line.

use anyhow::{bail, Result};
use std::collections::HashMap;

use plan_rag_core::models::{format_number, Answer};

use crate::app::App;
use crate::config::Config;

pub async fn run_query(config: &Config, content: &str, method: &str, filters: &[String]) -> Result<()> {
    let filter = parse_filters(filters)?;
    let app = App::from_config(config).await?;
    let answer = app.router.query(content, &filter, method).await?;
    print_answer(&answer);
    Ok(())
}

/// Parse repeated `key=value` arguments.
pub fn parse_filters(filters: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for f in filters {
        let Some((key, value)) = f.split_once('=') else {
            bail!("Invalid filter '{}': expected key=value", f);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid filter '{}': empty key", f);
        }
        map.insert(key.to_string(), value.trim().to_string());
    }
    Ok(map)
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.title);
    if !answer.description.is_empty() {
        println!("{}", answer.description);
    }
    println!();
    print!("{}", answer.table);
    println!();
    println!("total: {}", format_number(answer.total));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let parsed = parse_filters(&["difficulty=beginner".into(), " focus = kick ".into()]).unwrap();
        assert_eq!(parsed["difficulty"], "beginner");
        assert_eq!(parsed["focus"], "kick");
        assert!(parse_filters(&["nope".into()]).is_err());
        assert!(parse_filters(&["=x".into()]).is_err());
        assert!(parse_filters(&[]).unwrap().is_empty());
    }
}
