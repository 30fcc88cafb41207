use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use focusdeck_ipc::{
    format_duration, format_hours, read_message, write_message, Command, FocusStatus, Quadrant,
    Response, Task, TaskDraft, TaskEdit, TaskStatus,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "focusdeckctl")]
#[command(about = "Control the focusdeck session", long_about = None)]
struct Cli {
    /// Daemon socket (defaults to $XDG_RUNTIME_DIR/focusdeck.sock)
    #[arg(long, env = "FOCUSDECK_SOCKET")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task to a quadrant
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Comma-separated labels
        #[arg(short, long)]
        tags: Option<String>,
        /// 1 urgent+important, 2 important, 3 urgent, 4 neither
        #[arg(short, long, default_value = "1", value_parser = parse_quadrant)]
        quadrant: Quadrant,
    },
    /// Edit a task's text or quadrant
    Edit {
        #[arg(allow_negative_numbers = true)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        tags: Option<String>,
        #[arg(short, long, value_parser = parse_quadrant)]
        quadrant: Option<Quadrant>,
    },
    /// Move a task into focus
    Focus {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// Pause the focused task
    Pause {
        #[arg(allow_negative_numbers = true)]
        id: Option<i64>,
    },
    /// Mark a task done (defaults to the focused task)
    Done {
        #[arg(allow_negative_numbers = true)]
        id: Option<i64>,
    },
    /// Delete a task
    Delete {
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
    /// List tasks
    List {
        #[arg(short, long, value_parser = parse_quadrant)]
        quadrant: Option<Quadrant>,
    },
    /// Waiting tasks grouped by quadrant
    Board,
    /// Show the focused task
    Status,
    /// Today's and this week's totals
    Stats,
    /// Recently completed tasks
    Recent {
        #[arg(short = 'n', long, default_value_t = focusdeck_ipc::DEFAULT_RECENT_LIMIT)]
        limit: usize,
    },
    /// Tasks completed on a day (YYYY-MM-DD, defaults to today)
    History { date: Option<NaiveDate> },
    /// Days of a month with completions
    Days { year: Option<i32>, month: Option<u32> },
    /// Re-push tasks that failed to sync
    Reconcile,
    /// Show the scratch note, or replace it with TEXT
    Memo { text: Option<String> },
    /// Follow the focus timer
    Watch,
}

fn parse_quadrant(s: &str) -> Result<Quadrant, String> {
    let n: u8 = s.parse().map_err(|_| format!("not a quadrant number: {s}"))?;
    Quadrant::try_from(n)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(focusdeck_ipc::default_socket_path);
    let today = Local::now().date_naive();

    // Convert CLI command to IPC command
    let command = match cli.command {
        Commands::Add { title, description, tags, quadrant } => Command::Add(TaskDraft {
            title,
            description,
            tags,
            quadrant,
        }),
        Commands::Edit { id, title, description, tags, quadrant } => Command::Edit {
            id,
            edit: TaskEdit { title, description, tags, quadrant },
        },
        Commands::Focus { id } => Command::Focus { id },
        Commands::Pause { id } => Command::Pause { id },
        Commands::Done { id } => Command::Complete { id },
        Commands::Delete { id } => Command::Delete { id },
        Commands::List { quadrant } => Command::List { quadrant },
        Commands::Board => Command::Board,
        Commands::Status => Command::Status,
        Commands::Stats => Command::Stats,
        Commands::Recent { limit } => Command::Recent { limit },
        Commands::History { date } => Command::History { date: date.unwrap_or(today) },
        Commands::Days { year, month } => Command::ActiveDays {
            year: year.unwrap_or(today.year()),
            month: month.unwrap_or(today.month()),
        },
        Commands::Reconcile => Command::Reconcile,
        Commands::Memo { text: None } => Command::Memo,
        Commands::Memo { text: Some(text) } => Command::SetMemo { text },
        Commands::Watch => return watch(&socket).await,
    };

    let response = send_command(&socket, command).await?;

    match response {
        Response::Ok => println!("OK"),
        Response::Task(task) => print_task(&task),
        Response::Tasks(tasks) => {
            if tasks.is_empty() {
                println!("(no tasks)");
            }
            tasks.iter().for_each(print_task);
        }
        Response::Board(columns) => {
            for column in columns {
                println!("{}", column.quadrant);
                for task in &column.tasks {
                    print!("  ");
                    print_task(task);
                }
            }
        }
        Response::Status(status) | Response::Tick(status) => print_status(&status),
        Response::Stats(report) => {
            println!(
                "Today: {} done, {}h ({:.0}% of {}h goal)",
                report.today.count,
                format_hours(report.today.duration_seconds),
                report.daily_progress * 100.0,
                format_hours(report.daily_goal_seconds),
            );
            println!(
                "Week:  {} done, {}h",
                report.week.count,
                format_hours(report.week.duration_seconds)
            );
        }
        Response::Days(days) => {
            let days: Vec<_> = days.iter().map(|d| d.day().to_string()).collect();
            println!("{}", days.join(" "));
        }
        Response::Reconciled(count) => println!("Re-queued {count} write(s)"),
        Response::Memo(memo) if memo.is_empty() => println!("(empty memo)"),
        Response::Memo(memo) => println!("{memo}"),
        Response::Rejected(reason) => {
            eprintln!("Refused: {reason}");
            std::process::exit(1);
        }
        Response::Error(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_task(task: &Task) {
    let mark = match task.status {
        TaskStatus::Todo => " ",
        TaskStatus::Focused => ">",
        TaskStatus::Done => "✓",
    };
    let tags = task.tag_list();
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" #{}", tags.join(" #"))
    };
    println!(
        "[{}] {}: {} (Q{}) {}{}",
        mark,
        task.id,
        task.title,
        task.quadrant.number(),
        format_duration(task.duration_seconds),
        tags
    );
}

fn print_status(status: &FocusStatus) {
    match &status.task {
        Some(task) => println!(
            "Focus: {} ({}) {}",
            task.title,
            task.id,
            format_duration(status.elapsed_seconds)
        ),
        None => println!("Nothing in focus"),
    }
}

async fn connect(socket: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket)
        .await
        .with_context(|| format!("Could not reach focusdeck at {:?} - is it running?", socket))
}

async fn send_command(socket: &Path, cmd: Command) -> Result<Response> {
    let stream = connect(socket).await?;
    let (reader, mut writer) = stream.into_split();

    write_message(&mut writer, &cmd).await?;
    let response = read_message(&mut BufReader::new(reader)).await?;
    Ok(response)
}

async fn watch(socket: &Path) -> Result<()> {
    let stream = connect(socket).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    write_message(&mut writer, &Command::Watch).await?;

    loop {
        let response: Response = read_message(&mut reader).await?;
        if let Response::Tick(status) = response {
            let line = match &status.task {
                Some(task) => format!("{}  {}", format_duration(status.elapsed_seconds), task.title),
                None => "--:--:--  nothing in focus".to_string(),
            };
            print!("\r\x1b[2K{line}");
            std::io::stdout().flush()?;
        }
    }
}
