//! CLI (Command Line Interface) mode
//!
//! Interactive REPL that chats through the same [`ChatService`] the HTTP
//! API uses, bound to a single session id.

use std::borrow::Cow;
use std::sync::Arc;

use cs_core::{ChatService, Error, Role};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, PromptEditMode, PromptHistorySearch, Reedline, ReedlineEvent,
    ReedlineMenu, Signal, Suggestion,
};
use tracing::info;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show help"),
    ("/exit", "Exit the program"),
    ("/quit", "Exit the program"),
    ("/clear", "Clear the conversation history"),
    ("/history", "Show the conversation history"),
];

/// Longest message preview shown by /history
const PREVIEW_CHARS: usize = 100;

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the active session id
struct SessionPrompt {
    session_id: String,
    style: Style,
}

impl SessionPrompt {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for SessionPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(self.style.paint(format!("[{}] > ", self.session_id)).to_string())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: PromptEditMode) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        Cow::Borrowed("")
    }
}

/// Outcome of a slash command
#[derive(Debug, PartialEq, Eq)]
enum CommandAction {
    /// Not a command; send as a chat message
    Chat,
    /// Command handled, keep reading
    Continue,
    /// Leave the REPL
    Exit,
}

/// Run CLI interactive mode
pub async fn run_cli(chat: Arc<ChatService>, session_id: &str) -> anyhow::Result<()> {
    info!("Starting CLI mode for session {}", session_id);

    print_welcome(session_id);

    let mut keybindings = default_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = SessionPrompt::new(session_id);

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                if handle_line(&chat, session_id, &line).await == CommandAction::Exit {
                    break;
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\nGoodbye!\n");
                break;
            }
            Err(err) => {
                eprintln!("\n{} {}\n", Color::Red.paint("Error:"), err);
                break;
            }
        }
    }

    Ok(())
}

/// Handle one submitted line: a command, a chat message, or nothing
async fn handle_line(chat: &ChatService, session_id: &str, line: &str) -> CommandAction {
    let input = line.trim();
    if input.is_empty() {
        return CommandAction::Continue;
    }

    match handle_command(chat, session_id, input).await {
        CommandAction::Chat => {}
        action => return action,
    }

    // Commands are matched trimmed, messages are stored as typed
    match chat.handle_turn(session_id, line).await {
        Ok(reply) => {
            let label = if reply.fallback {
                Color::Yellow.paint("AI (fallback):")
            } else {
                Color::Green.paint("AI:")
            };
            println!("\n{} {}\n", label, reply.reply);
        }
        Err(Error::Gateway(e)) => {
            eprintln!(
                "\n{} completion failed ({}): {}\n",
                Color::Red.paint("Error:"),
                e.kind(),
                e
            );
        }
        Err(e) => {
            eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e);
        }
    }

    CommandAction::Continue
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Handle special commands (/exit, /clear, /help, /history)
async fn handle_command(chat: &ChatService, session_id: &str, input: &str) -> CommandAction {
    let lower = input.to_lowercase();

    match lower.as_str() {
        "/exit" | "/quit" | "/q" => {
            println!("\nGoodbye!\n");
            CommandAction::Exit
        }
        "/clear" => {
            chat.store().remove(session_id);
            println!("\nConversation history cleared.\n");
            CommandAction::Continue
        }
        "/help" | "/?" => {
            print_help();
            CommandAction::Continue
        }
        "/history" => {
            let turns = chat.store().history(session_id).await.unwrap_or_default();
            print_history(&turns);
            CommandAction::Continue
        }
        _ if lower.starts_with('/') => {
            eprintln!("\nUnknown command: {}. Type /help for a list of commands.\n", input);
            CommandAction::Continue
        }
        _ => CommandAction::Chat,
    }
}

/// Print welcome message
fn print_welcome(session_id: &str) {
    println!();
    println!("{}", Color::Cyan.bold().paint("cs-agent CLI - interactive mode"));
    println!("Session: {}", session_id);
    println!("Type a message and press Enter to chat.");
    println!("Commands: /help, /exit, /clear, /history");
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
    println!("Typing / shows command suggestions; use the arrow keys to pick one.");
    println!();
}

/// One-line preview of a message, cut on a char boundary
fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

/// Print conversation history
fn print_history(turns: &[cs_core::Turn]) {
    println!();
    println!("Conversation history ({} messages):", turns.len());
    println!("{}", "─".repeat(50));

    for (i, turn) in turns.iter().enumerate() {
        let role = match turn.role {
            Role::User => Color::Blue.paint("You"),
            Role::Assistant => Color::Green.paint("AI"),
        };
        println!("{}. {}: {}", i + 1, role, preview(&turn.content));
    }

    println!("{}", "─".repeat(50));
    println!();
}
