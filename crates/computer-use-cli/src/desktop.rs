use std::io::Cursor;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use enigo::{Button, Coordinate as Position, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use image::ImageFormat;
use xcap::Monitor;

use computer_use::effector::{Effector, ScreenshotSource};
use computer_use::errors::{ComputerUseError, ComputerUseResult};
use computer_use::grounding::Coordinate;
use computer_use::models::action::Action;

const TYPING_CHUNK: usize = 50;
const TYPING_PAUSE: Duration = Duration::from_millis(12);
const OUTPUT_LIMIT: usize = 2000;

/// Drives the local keyboard, mouse and shell.
pub struct DesktopEffector {
    enigo: Enigo,
}

impl DesktopEffector {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("could not connect to the display: {}", e))?;
        Ok(Self { enigo })
    }

    fn click(&mut self, button: Button, count: usize, target: Option<Coordinate>) -> Result<String> {
        if let Some(point) = target {
            self.enigo.move_mouse(point.x as i32, point.y as i32, Position::Abs)?;
        }
        for _ in 0..count {
            self.enigo.button(button, Direction::Click)?;
        }
        Ok(match target {
            Some(point) => format!("at ({}, {})", point.x, point.y),
            None => "at the pointer position".to_string(),
        })
    }

    fn send_keys(&mut self, combo: &str) -> Result<()> {
        let keys = parse_key_combo(combo)?;
        if keys.is_empty() {
            return Err(anyhow!("empty key combination"));
        }
        let enigo = &mut self.enigo;
        Ok(press_combo(&keys, |key, direction| enigo.key(key, direction))?)
    }

    fn type_text(&mut self, text: &str) -> Result<()> {
        let chars: Vec<char> = text.chars().collect();
        for (i, chunk) in chars.chunks(TYPING_CHUNK).enumerate() {
            if i > 0 {
                thread::sleep(TYPING_PAUSE);
            }
            self.enigo.text(&chunk.iter().collect::<String>())?;
        }
        Ok(())
    }

    fn perform(&mut self, action: &Action, target: Option<Coordinate>) -> Result<String> {
        match action {
            Action::Stop => Ok("Nothing to do".to_string()),
            Action::RunCommand { command } => run_command(command),
            Action::RunBackgroundCommand { command } => {
                let child = shell(command)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                Ok(format!("Started in the background (pid {}): {}", child.id(), command))
            }
            Action::SendKey { name } => {
                self.send_keys(name)?;
                Ok(format!("Sent key combination: {}", name))
            }
            Action::TypeText { text } => {
                self.type_text(text)?;
                Ok(format!("Typed text: {}", text))
            }
            Action::Click { query } => {
                let at = self.click(Button::Left, 1, target)?;
                Ok(format!("Clicked {} {}", query, at))
            }
            Action::DoubleClick { query } => {
                let at = self.click(Button::Left, 2, target)?;
                Ok(format!("Double-clicked {} {}", query, at))
            }
            Action::RightClick { query } => {
                let at = self.click(Button::Right, 1, target)?;
                Ok(format!("Right-clicked {} {}", query, at))
            }
        }
    }
}

impl Effector for DesktopEffector {
    fn execute(&mut self, action: &Action, target: Option<Coordinate>) -> ComputerUseResult<String> {
        tracing::debug!(action = action.name(), ?target, "executing");
        self.perform(action, target)
            .map_err(|e| ComputerUseError::Effector(format!("{}: {:#}", action.name(), e)))
    }
}

fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run `command` to completion and summarize its exit status and output.
pub fn run_command(command: &str) -> Result<String> {
    let output = shell(command).stdin(Stdio::null()).output()?;
    let mut text = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stderr.trim_end());
    }
    if text.chars().count() > OUTPUT_LIMIT {
        text = text.chars().take(OUTPUT_LIMIT).collect::<String>() + "...";
    }

    let status = match output.status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    };
    if text.is_empty() {
        Ok(format!("Command executed ({}): {}", status, command))
    } else {
        Ok(format!("Command executed ({}): {}\n{}", status, command, text))
    }
}

/// Hold every key but the last, click the last, then release the held keys in
/// reverse order. Keys already held are released even when a later press fails.
fn press_combo<E>(keys: &[Key], mut send: impl FnMut(Key, Direction) -> Result<(), E>) -> Result<(), E> {
    let Some((last, modifiers)) = keys.split_last() else {
        return Ok(());
    };
    let mut held = Vec::with_capacity(modifiers.len());
    let mut result = Ok(());
    for key in modifiers {
        result = send(*key, Direction::Press);
        if result.is_err() {
            break;
        }
        held.push(*key);
    }
    if result.is_ok() {
        result = send(*last, Direction::Click);
    }
    let released = held.iter().rev().try_for_each(|key| send(*key, Direction::Release));
    result.and(released)
}

/// Split a combination such as `Ctrl-C` or `ctrl+shift+t` into keys.
///
/// A separator directly after another one is the key itself, so `Ctrl--`
/// and `Ctrl-+` press minus and plus.
pub fn parse_key_combo(combo: &str) -> Result<Vec<Key>> {
    let combo = combo.trim();
    if combo.chars().count() == 1 {
        return parse_key(combo).map(|key| vec![key]);
    }

    let (head, separator_key) = match combo.char_indices().last() {
        Some((i, c)) if is_separator(c) && combo[..i].ends_with(is_separator) => {
            (&combo[..i - 1], Some(Key::Unicode(c)))
        }
        _ => (combo, None),
    };

    let mut keys = Vec::new();
    if !head.is_empty() {
        for part in head.split(is_separator) {
            if part.trim().is_empty() {
                return Err(anyhow!("incomplete key combination: {}", combo));
            }
            keys.push(parse_key(part)?);
        }
    }
    keys.extend(separator_key);
    Ok(keys)
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '+'
}

fn parse_key(name: &str) -> Result<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::Control,
        "shift" => Key::Shift,
        "alt" | "option" => Key::Alt,
        "super" | "win" | "windows" | "cmd" | "command" | "meta" => Key::Meta,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "space" => Key::Space,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" | "pgup" => Key::PageUp,
        "pagedown" | "page_down" | "pgdn" => Key::PageDown,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(anyhow!("unknown key: {}", name)),
            }
        }
    };
    Ok(key)
}

/// Captures the primary monitor.
#[derive(Debug, Default)]
pub struct PrimaryMonitor;

impl PrimaryMonitor {
    fn capture_png(&self) -> Result<Vec<u8>> {
        let monitors = Monitor::all()?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| anyhow!("no monitor found"))?;

        let image = monitor.capture_image()?;
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            bytes = bytes.len(),
            "captured screenshot"
        );
        Ok(bytes)
    }
}

impl ScreenshotSource for PrimaryMonitor {
    fn capture(&mut self) -> ComputerUseResult<Vec<u8>> {
        self.capture_png()
            .map_err(|e| ComputerUseError::Effector(format!("screenshot: {:#}", e)))
    }
}
