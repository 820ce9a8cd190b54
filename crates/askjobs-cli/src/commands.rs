//! Command line parsing for the interactive shell.

use askjobs_core::auth::Route;
use askjobs_core::models::JobFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Login,
    Logout,
    WhoAmI,
    SignUp,
    Jobs(JobFilter),
    Job(i64),
    Apply { job: i64, introduction: String },
    Questions,
    Question(i64),
    Ask { title: String, content: String },
    Answer { question: i64, comment: String },
    DeleteQuestion(i64),
    DeleteAnswer { question: i64, answer: i64 },
    Chat(String),
    Open(Route),
}

pub const HELP: &str = "\
Commands:
  login | logout | whoami | signup
  jobs [all|recruiting|closed]      list job postings
  job <id>                          show one posting
  apply <id> <introduction>         apply to a posting
  questions                         list community questions
  question <id>                     show a question and its answers
  ask <title> | <content>           post a question
  answer <id> <comment>             answer a question
  delete-question <id>
  delete-answer <question> <answer>
  chat <message>                    ask the assistant
  open <path>                       open a view by path, e.g. /jobs/apply/3
  help | quit";

impl Command {
    /// The view this command shows, checked against the route guard before
    /// anything is sent.
    pub fn route(&self) -> Option<Route> {
        match self {
            Command::Help | Command::Quit | Command::Logout | Command::WhoAmI => None,
            Command::Login => Some(Route::Login),
            Command::SignUp => Some(Route::SignUp),
            Command::Jobs(_) => Some(Route::Jobs),
            Command::Job(id) => Some(Route::JobDetail(*id)),
            Command::Apply { job, .. } => Some(Route::JobApply(*job)),
            Command::Questions => Some(Route::Community),
            Command::Question(id) => Some(Route::QuestionDetail(*id)),
            Command::Ask { .. } => Some(Route::MakeQuestion),
            Command::Answer { question, .. } => Some(Route::QuestionDetail(*question)),
            Command::DeleteQuestion(id) => Some(Route::QuestionDetail(*id)),
            Command::DeleteAnswer { question, .. } => Some(Route::QuestionDetail(*question)),
            Command::Chat(_) => Some(Route::ChatBot),
            Command::Open(route) => Some(*route),
        }
    }
}

fn parse_index(raw: Option<&str>, what: &str) -> Result<i64, String> {
    let raw = raw.ok_or_else(|| format!("missing {}", what))?;
    raw.parse()
        .map_err(|_| format!("{} must be a number, got '{}'", what, raw))
}

fn require_text(raw: &str, what: &str) -> Result<String, String> {
    let text = raw.trim();
    if text.is_empty() {
        Err(format!("missing {}", what))
    } else {
        Ok(text.to_string())
    }
}

/// Parse one input line. Empty input yields `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let mut words = rest.split_whitespace();

    let command = match name.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "login" => Command::Login,
        "logout" => Command::Logout,
        "whoami" => Command::WhoAmI,
        "signup" => Command::SignUp,
        "jobs" => {
            let filter = JobFilter::parse(rest)
                .ok_or_else(|| format!("unknown filter '{}', use all, recruiting or closed", rest))?;
            Command::Jobs(filter)
        }
        "job" => Command::Job(parse_index(words.next(), "job id")?),
        "apply" => {
            let job = parse_index(words.next(), "job id")?;
            let introduction = require_text(words.collect::<Vec<_>>().join(" ").as_str(), "introduction")?;
            Command::Apply { job, introduction }
        }
        "questions" => Command::Questions,
        "question" => Command::Question(parse_index(words.next(), "question id")?),
        "ask" => {
            let (title, content) = rest
                .split_once('|')
                .ok_or_else(|| "usage: ask <title> | <content>".to_string())?;
            Command::Ask {
                title: require_text(title, "title")?,
                content: require_text(content, "content")?,
            }
        }
        "answer" => {
            let question = parse_index(words.next(), "question id")?;
            let comment = require_text(words.collect::<Vec<_>>().join(" ").as_str(), "comment")?;
            Command::Answer { question, comment }
        }
        "delete-question" => Command::DeleteQuestion(parse_index(words.next(), "question id")?),
        "delete-answer" => Command::DeleteAnswer {
            question: parse_index(words.next(), "question id")?,
            answer: parse_index(words.next(), "answer id")?,
        },
        "chat" => Command::Chat(require_text(rest, "message")?),
        "open" => {
            let route = Route::from_path(rest).ok_or_else(|| format!("unknown path '{}'", rest))?;
            Command::Open(route)
        }
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };

    Ok(Some(command))
}
