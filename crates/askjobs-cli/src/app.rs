//! Interactive shell state and command dispatch.

use std::io::{self, Write};

use anyhow::Result;
use askjobs_core::api::{ApiClient, ExecutorError};
use askjobs_core::auth::{DenyReason, Permit, Route};
use askjobs_core::models::{Answer, Job, JobFilter, Question, SignUpRequest};
use askjobs_core::Config;
use chrono::Local;
use tracing::{info, warn};

use crate::commands::{self, Command, HELP};

/// Whether the shell should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    config: Config,
    client: ApiClient,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::new(&config)?;

        client.session().on_change(|snapshot| match snapshot.username() {
            Some(username) => println!("Signed in as {}.", username),
            None => println!("Signed out."),
        });

        Ok(Self { config, client })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("ASK 2.0 - jobs and community ({})", self.config.base_url);
        println!("Type 'help' for commands.\n");

        loop {
            let prompt = match self.client.session().username() {
                Some(username) => format!("{}> ", username),
                None => "guest> ".to_string(),
            };
            let Some(line) = read_line(&prompt)? else {
                break;
            };

            let command = match commands::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    println!("{}", message);
                    continue;
                }
            };

            if self.dispatch(command).await? == Flow::Quit {
                break;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        if matches!(command, Command::Quit) {
            return Ok(Flow::Quit);
        }

        if let Some(route) = command.route() {
            if !self.enter(route).await? {
                return Ok(Flow::Continue);
            }
        }

        if let Err(e) = self.execute(command).await {
            self.report(e).await?;
        }
        Ok(Flow::Continue)
    }

    /// Check `route` against the guard, offering a login when it needs one.
    async fn enter(&mut self, route: Route) -> Result<bool> {
        match self.client.guard().permit(&route) {
            Permit::Allowed => Ok(true),
            Permit::Denied(DenyReason::NotAuthenticated) => {
                println!("{} requires login.", route.path());
                if let Err(e) = self.login_interactive().await {
                    println!("Login failed: {}", e);
                    return Ok(false);
                }
                Ok(self.client.guard().permit(&route).is_allowed())
            }
            Permit::Denied(DenyReason::NotOwner) => {
                println!("Not allowed.");
                Ok(false)
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Help => println!("{}", HELP),
            Command::Quit => {}
            Command::Login => self.login_interactive().await?,
            Command::Logout => self.client.logout().await?,
            Command::WhoAmI => self.who_am_i(),
            Command::SignUp => self.sign_up_interactive().await?,
            Command::Jobs(filter) => self.list_jobs(filter).await?,
            Command::Job(id) => print_job(&self.client.fetch_job(id).await?),
            Command::Apply { job, introduction } => {
                self.client.apply_to_job(job, &introduction).await?;
                println!("Application sent.");
            }
            Command::Questions => self.list_questions().await?,
            Command::Question(id) => self.show_question(id).await?,
            Command::Ask { title, content } => {
                self.client.make_question(&title, &content).await?;
                println!("Question posted.");
            }
            Command::Answer { question, comment } => {
                self.client.make_answer(question, &comment).await?;
                println!("Answer posted.");
            }
            Command::DeleteQuestion(id) => {
                let question = self.client.fetch_question(id).await?;
                self.client.delete_question(&question).await?;
                println!("Question deleted.");
            }
            Command::DeleteAnswer { question, answer } => {
                let target = self
                    .client
                    .fetch_answers(question)
                    .await?
                    .into_iter()
                    .find(|a| a.answer_index == answer)
                    .ok_or_else(|| anyhow::anyhow!("No answer {} on question {}", answer, question))?;
                self.client.delete_answer(&target).await?;
                println!("Answer deleted.");
            }
            Command::Chat(message) => {
                let reply = self.client.chat(&message).await?;
                println!("{}", reply);
            }
            Command::Open(route) => self.open(route).await?,
        }
        Ok(())
    }

    async fn open(&mut self, route: Route) -> Result<()> {
        match route {
            Route::Home | Route::About => println!("ASK 2.0 - job postings, community Q&A and a career assistant."),
            Route::Login => self.login_interactive().await?,
            Route::SignUp => self.sign_up_interactive().await?,
            Route::Jobs => self.list_jobs(JobFilter::All).await?,
            Route::JobDetail(id) | Route::JobApply(id) => print_job(&self.client.fetch_job(id).await?),
            Route::Community => self.list_questions().await?,
            Route::QuestionDetail(id) => self.show_question(id).await?,
            Route::MakeQuestion => println!("Use: ask <title> | <content>"),
            Route::ChatBot => println!("Use: chat <message>"),
        }
        Ok(())
    }

    /// Print a failure. An ended session sends the user back to login.
    async fn report(&mut self, error: anyhow::Error) -> Result<()> {
        match error.downcast_ref::<ExecutorError>() {
            Some(ExecutorError::SessionExpired) => {
                println!("{}", ExecutorError::SessionExpired);
                if let Err(e) = self.login_interactive().await {
                    println!("Login failed: {}", e);
                }
            }
            Some(ExecutorError::Unauthenticated) => println!("Please log in first."),
            _ => {
                warn!(error = %error, "Command failed");
                println!("Error: {:#}", error);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login_interactive(&mut self) -> Result<()> {
        println!("\n=== ASK 2.0 Login ===\n");

        let username = match self.config.last_username.clone() {
            Some(last_user) => {
                let input = read_line(&format!("Username [{}]: ", last_user))?.unwrap_or_default();
                if input.is_empty() {
                    last_user
                } else {
                    input
                }
            }
            None => Self::prompt_username()?,
        };
        let password = Self::prompt_password()?;

        println!("\nAuthenticating...");
        self.client.login(&username, &password).await?;

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    async fn sign_up_interactive(&mut self) -> Result<()> {
        println!("\n=== ASK 2.0 Sign Up ===\n");

        let username = Self::prompt_username()?;
        let password = Self::prompt_password()?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm {
            anyhow::bail!("Passwords do not match");
        }
        let name = read_line("Name: ")?.unwrap_or_default();
        let email = read_line("Email: ")?.unwrap_or_default();
        let job_status = read_line("Job status (e.g. seeking, employed): ")?.unwrap_or_default();

        let request = SignUpRequest {
            username,
            password,
            name,
            email,
            role: "USER".to_string(),
            job_status,
        };
        self.client.sign_up(&request).await?;
        info!("Account created");
        println!("Account created. Use 'login' to sign in.");
        Ok(())
    }

    fn who_am_i(&self) {
        let snapshot = self.client.session().snapshot();
        match snapshot.identity() {
            Some(identity) => println!(
                "{} (member #{}), access token valid for {} min",
                identity.username,
                identity.member_index,
                identity.minutes_until_expiry()
            ),
            None => println!("Not logged in."),
        }
    }

    fn prompt_username() -> Result<String> {
        Ok(read_line("Username: ")?.unwrap_or_default())
    }

    fn prompt_password() -> Result<String> {
        let password = rpassword::prompt_password("Password: ")?;
        Ok(password)
    }

    // =========================================================================
    // Listings
    // =========================================================================

    async fn list_jobs(&self, filter: JobFilter) -> Result<()> {
        let jobs = self.client.fetch_jobs(filter).await?;
        if jobs.is_empty() {
            println!("No {} jobs.", filter.to_string().to_lowercase());
            return Ok(());
        }
        for job in &jobs {
            println!(
                "#{:<4} {:<40} {:<12} {}",
                job.jobs_index,
                job.title,
                job.location.as_deref().unwrap_or("-"),
                format_deadline(job)
            );
        }
        Ok(())
    }

    async fn list_questions(&self) -> Result<()> {
        let questions = self.client.fetch_questions().await?;
        if questions.is_empty() {
            println!("No questions yet.");
        }
        for q in &questions {
            println!("#{:<4} {:<50} {}", q.question_index, q.title, q.formatted_date());
        }
        Ok(())
    }

    async fn show_question(&self, id: i64) -> Result<()> {
        let question = self.client.fetch_question(id).await?;
        let answers = self.client.fetch_answers(id).await?;
        print_question(&question, &answers, self.client.session().member_index());
        Ok(())
    }
}

// ============================================================================
// Output helpers
// ============================================================================

fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn format_deadline(job: &Job) -> String {
    match job.deadline() {
        Some(end) => end.with_timezone(&Local).format("until %Y-%m-%d").to_string(),
        None => "no deadline".to_string(),
    }
}

fn print_job(job: &Job) {
    println!("\n#{} {}", job.jobs_index, job.title);
    let fields = [
        ("Level", &job.level),
        ("Location", &job.location),
        ("Qualification", &job.qualification),
        ("Responsibilities", &job.responsibilities),
        ("Preferences", &job.preferences),
        ("Starts", &job.start_date),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<17}{}", format!("{}:", label), value);
        }
    }
    println!("  {:<17}{}\n", "Deadline:", format_deadline(job));
}

/// Mark content the current member wrote; only that can be deleted.
fn print_question(question: &Question, answers: &[Answer], me: Option<i64>) {
    let mine = |author: i64| if me == Some(author) { " (you)" } else { "" };

    println!("\n#{} {}{}", question.question_index, question.title, mine(question.member_index));
    println!(
        "  posted {}{}",
        question.formatted_date(),
        if question.is_edited() { ", edited" } else { "" }
    );
    println!("\n{}\n", question.content);

    if answers.is_empty() {
        println!("  No answers yet.");
    }
    for answer in answers {
        println!(
            "  [{}] {} - {}{}",
            answer.answer_index,
            answer.formatted_date(),
            answer.comment,
            mine(answer.member_index)
        );
    }
    println!();
}
