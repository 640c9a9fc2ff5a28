extern crate marain_client;

use anyhow::{anyhow, Result};
use log::info;
use marain_client::{
    domain::{
        commands::Command,
        conversation::{is_own, ActiveView},
    },
    services::{
        config::ClientConfig,
        engine::EngineState,
        session_worker::{spawn_session, Update},
    },
};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

/// Prints whatever the active view gained since the last state.
#[derive(Default)]
struct Screen {
    view: Option<ActiveView>,
    shown: usize,
    connection: Option<String>,
}

impl Screen {
    fn render(&mut self, state: &EngineState) {
        let connection = state.connection_state.to_string();
        if self.connection.as_deref() != Some(connection.as_str()) {
            println!("-- {connection} --");
            self.connection = Some(connection);
        }

        if self.view.as_ref() != Some(&state.active_view) {
            println!("== {} ==", state.active_view);
            self.view = Some(state.active_view.clone());
            self.shown = 0;
        }

        let local = state.local_user.as_deref().unwrap_or_default();
        for event in state.visible_messages.iter().skip(self.shown) {
            let marker = if is_own(event, local) { ">" } else { " " };
            println!("{marker} {event}");
        }
        self.shown = state.visible_messages.len();
    }

    fn who(state: &EngineState) {
        let peers: Vec<&str> = state.peers().map(String::as_str).collect();
        if peers.is_empty() {
            println!("Nobody else is online.");
        } else {
            println!("Online: {}", peers.join(", "));
        }
    }
}

async fn read_name(lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>) -> Result<String> {
    if let Some(name) = std::env::args().nth(1) {
        return Ok(name);
    }
    println!("Username:");
    match lines.next_line().await? {
        Some(name) => Ok(name),
        None => Err(anyhow!("stdin closed before a username was given")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::try_init();
    let config = ClientConfig::from_env();
    info!("Using broker {}", config.broker_url);

    let mut lines = BufReader::new(stdin()).lines();
    let name = read_name(&mut lines).await?;

    let mut session = spawn_session(config);
    session.send(Command::Join(name))?;

    let mut screen = Screen::default();
    let mut latest: Option<EngineState> = None;
    let mut stdin_open = true;

    'main_loop: loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    stdin_open = false;
                    session.send(Command::Logout)?;
                    continue 'main_loop;
                };
                if line.trim() == "/who" {
                    if let Some(state) = &latest {
                        Screen::who(state);
                    }
                    continue 'main_loop;
                }
                let private = latest
                    .as_ref()
                    .is_some_and(|s| matches!(s.active_view, ActiveView::PrivateWith(_)));
                match Command::from_line(&line, private) {
                    Some(command) => session.send(command)?,
                    None => println!("Commands: /pm <user>, /room, /who, /quit"),
                }
            }

            update = session.next_update() => {
                match update {
                    Some(Update::State(state)) => {
                        screen.render(&state);
                        latest = Some(state);
                    }
                    Some(Update::Notice(text)) => println!("!! {text}"),
                    Some(Update::Ended) | None => break 'main_loop,
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
