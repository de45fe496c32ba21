use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    io,
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notebookchat::app::App;
use notebookchat::realtime::SocketClient;
use notebookchat::service::{AuthService, ChatService, Credentials, Registration, RestClient};
use notebookchat::{ui, Config, SessionStore};

fn cli() -> Command {
    Command::new("notebookchat")
        .version(env!("CARGO_PKG_VERSION"))
        .author("NotebookChat Team")
        .about("Terminal client for NotebookChat one-to-one messaging")
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .value_name("URL")
                .global(true)
                .help("Base URL of the chat API (overrides config.toml)"),
        )
        .arg(
            Arg::new("socket-url")
                .long("socket-url")
                .value_name("URL")
                .global(true)
                .help("Base URL of the realtime channel (overrides config.toml)"),
        )
        .arg(
            Arg::new("no-realtime")
                .long("no-realtime")
                .action(ArgAction::SetTrue)
                .help("Do not open the realtime channel"),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in and remember the session")
                .arg(Arg::new("email").long("email").value_name("EMAIL").required(true))
                .arg(Arg::new("password").long("password").value_name("PASSWORD").required(true)),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and sign in")
                .arg(Arg::new("name").long("name").value_name("NAME").required(true))
                .arg(Arg::new("email").long("email").value_name("EMAIL").required(true))
                .arg(Arg::new("password").long("password").value_name("PASSWORD").required(true)),
        )
        .subcommand(Command::new("logout").about("Sign out and forget the saved session"))
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "notebookchat=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing --{}", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = Config::load()?;
    if let Some(url) = matches.get_one::<String>("api-url") {
        config.api_url = url.clone();
    }
    if let Some(url) = matches.get_one::<String>("socket-url") {
        config.socket_url = url.clone();
    }
    init_logging(&config.log_file)?;

    let rest = RestClient::from_config(&config)?;
    let store = SessionStore::new()?;

    match matches.subcommand() {
        Some(("login", sub)) => {
            let credentials = Credentials {
                email: required(sub, "email")?.to_string(),
                password: required(sub, "password")?.to_string(),
            };
            let session = rest.login(&credentials).await?;
            store.save(&session).await?;
            println!("Signed in as {}.", session.user.name);
            Ok(())
        }
        Some(("register", sub)) => {
            let registration = Registration {
                name: required(sub, "name")?.to_string(),
                email: required(sub, "email")?.to_string(),
                password: required(sub, "password")?.to_string(),
            };
            let session = rest.register(&registration).await?;
            store.save(&session).await?;
            println!("Account created. Signed in as {}.", session.user.name);
            Ok(())
        }
        Some(("logout", _)) => {
            logout(&rest, &store).await?;
            println!("Signed out.");
            Ok(())
        }
        _ => run_chat(config, rest, store, !matches.get_flag("no-realtime")).await,
    }
}

/// End the session on the server and locally. The local session is cleared
/// even if the server call fails, so the user is never stuck signed in.
async fn logout(rest: &RestClient, store: &SessionStore) -> Result<()> {
    if let Some(session) = store.load().await {
        if let Err(e) = rest.logout(&session.token).await {
            warn!("server logout failed: {}", e);
        }
        info!(user = %session.user.name, "signed out");
    }
    store.clear().await?;
    Ok(())
}

async fn run_chat(
    config: Config,
    rest: RestClient,
    store: SessionStore,
    realtime: bool,
) -> Result<()> {
    let session = store.load().await.ok_or_else(|| {
        anyhow!("Not signed in. Run `notebookchat login --email <EMAIL> --password <PASSWORD>` first.")
    })?;

    let chat: Arc<dyn ChatService> = Arc::new(rest.clone());
    let mut app = App::new(session.clone(), chat, &config);
    app.load_users();

    if realtime {
        let connected = match SocketClient::new(&config.socket_url, session.user_id()) {
            Ok(client) => client.connect().await,
            Err(e) => Err(e),
        };
        match connected {
            Ok((handle, events)) => app.attach_channel(handle, events),
            Err(e) => {
                warn!("realtime channel unavailable: {}", e);
                app.add_status_message(format!("Realtime channel unavailable: {}", e));
            }
        }
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    app.detach_channel();

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    if app.logout_requested {
        logout(&rest, &store).await?;
        println!("Signed out.");
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(100);

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout_duration = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout_duration)? {
            let event = event::read()?;
            app.handle_input(event).await?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick().await?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
