use serde::{Deserialize, Serialize};

use super::parse_server_date;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_index: i64,
    pub member_index: i64,
    pub title: String,
    pub content: String,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_index: i64,
    pub member_index: i64,
    #[serde(default)]
    pub question_index: Option<i64>,
    pub comment: String,
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
}

fn display_date(raw: Option<&str>) -> String {
    match raw {
        Some(raw) => match parse_server_date(raw) {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => raw.chars().take(10).collect(),
        },
        None => "-".to_string(),
    }
}

fn was_edited(created: Option<&str>, updated: Option<&str>) -> bool {
    matches!((created, updated), (Some(c), Some(u)) if c != u)
}

impl Question {
    pub fn formatted_date(&self) -> String {
        display_date(self.created_date.as_deref())
    }

    pub fn is_edited(&self) -> bool {
        was_edited(self.created_date.as_deref(), self.updated_date.as_deref())
    }
}

impl Answer {
    pub fn formatted_date(&self) -> String {
        display_date(self.created_date.as_deref())
    }

    pub fn is_edited(&self) -> bool {
        was_edited(self.created_date.as_deref(), self.updated_date.as_deref())
    }
}
