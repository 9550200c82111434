// Terminal chat transport: one participant typing on stdin.
//
// Messages are printed with their buttons numbered from 1. `#N` presses
// button N of the most recently shown message that still has buttons.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use livepoll_app::chat::{ChatError, ChatId, ChatTransport, MessageHandle};
use livepoll_app::keyboard::{Button, Keyboard};
use livepoll_app::router::Inbound;

/// The only chat a console process serves.
pub const CONSOLE_CHAT: ChatId = ChatId(1);

#[derive(Default)]
pub struct ConsoleChat {
    next_id: AtomicI64,
    /// Live keyboards, most recently rendered last.
    keyboards: Mutex<Vec<(MessageHandle, Vec<Button>)>>,
}

impl ConsoleChat {
    pub fn new() -> Self {
        ConsoleChat::default()
    }

    /// Interpret one input line. Returns `None` for blank lines and unknown
    /// button numbers.
    pub fn parse_line(&self, line: &str) -> Option<Inbound> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(number) = line.strip_prefix('#') else {
            return Some(Inbound::from_text(line));
        };
        let Ok(number) = number.trim().parse::<usize>() else {
            return Some(Inbound::Text(line.to_string()));
        };

        let keyboards = self.lock();
        let button = keyboards
            .last()
            .and_then(|(_, buttons)| buttons.get(number.checked_sub(1)?));
        match button {
            Some(button) => Some(Inbound::Pressed(button.action)),
            None => {
                println!("  (no button #{number})");
                None
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(MessageHandle, Vec<Button>)>> {
        self.keyboards
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `keyboard` as the newest for `message`, or forget the message's
    /// buttons when it no longer has any.
    fn remember(&self, message: MessageHandle, keyboard: Option<&Keyboard>) {
        let mut keyboards = self.lock();
        keyboards.retain(|(handle, _)| *handle != message);
        if let Some(keyboard) = keyboard {
            let buttons: Vec<Button> = keyboard.buttons().cloned().collect();
            if !buttons.is_empty() {
                keyboards.push((message, buttons));
            }
        }
    }

    fn print(
        &self,
        header: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChatError> {
        let mut out = String::new();
        out.push_str(&format!("{header} {}\n", plain_text(text).replace('\n', "\n    ")));
        if let Some(keyboard) = keyboard {
            let mut number = 0;
            for row in &keyboard.rows {
                let labels: Vec<String> = row
                    .iter()
                    .map(|button| {
                        number += 1;
                        format!("[#{number} {}]", button.label)
                    })
                    .collect();
                out.push_str(&format!("    {}\n", labels.join(" ")));
            }
        }
        write_out(&out)
    }
}

#[async_trait]
impl ChatTransport for ConsoleChat {
    async fn send(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageHandle, ChatError> {
        let message = MessageHandle {
            chat,
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.print(&format!("[{}]", message.id), text, keyboard)?;
        self.remember(message, keyboard);
        Ok(message)
    }

    async fn edit(
        &self,
        message: MessageHandle,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChatError> {
        self.print(&format!("[{}*]", message.id), text, keyboard)?;
        self.remember(message, keyboard);
        Ok(())
    }

    async fn delete(&self, message: MessageHandle) -> Result<(), ChatError> {
        self.remember(message, None);
        write_out(&format!("[{}] (removed)\n", message.id))
    }
}

fn write_out(text: &str) -> Result<(), ChatError> {
    write_to(&mut std::io::stdout().lock(), text)
}

/// Write and flush `text`. A closed terminal is a transport failure rather
/// than the panic `println!` would raise.
fn write_to(out: &mut impl Write, text: &str) -> Result<(), ChatError> {
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .map_err(|e| ChatError::Transport(format!("console output: {e}")))
}

/// Strip the HTML markup used in message texts and undo its escaping.
pub fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_app::keyboard::{cancel_keyboard, queue_changed_keyboard, Action, QueueChoice};

    #[test]
    fn plain_text_strips_tags_and_entities() {
        assert_eq!(
            plain_text("<b>A &lt;b&gt; &amp; c</b>\n\n<i>why?</i>"),
            "A <b> & c\n\nwhy?"
        );
    }

    #[tokio::test]
    async fn numbers_press_buttons_of_newest_keyboard() {
        let chat = ConsoleChat::new();
        let question = chat
            .send(CONSOLE_CHAT, "question", Some(&cancel_keyboard()))
            .await
            .unwrap();
        let notice = chat
            .send(CONSOLE_CHAT, "notice", Some(&queue_changed_keyboard()))
            .await
            .unwrap();

        assert_eq!(
            chat.parse_line("#2"),
            Some(Inbound::Pressed(Action::QueueChanged(QueueChoice::Advance)))
        );

        // Once the notice is gone the question's buttons are current again.
        chat.delete(notice).await.unwrap();
        assert_eq!(chat.parse_line("#1"), Some(Inbound::Pressed(Action::Cancel)));
        assert_eq!(chat.parse_line("#2"), None);

        chat.edit(question, "done", None).await.unwrap();
        assert_eq!(chat.parse_line("#1"), None);
    }

    struct ClosedTerminal;

    impl Write for ClosedTerminal {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_terminal_is_a_transport_error() {
        let err = write_to(&mut ClosedTerminal, "hello\n").unwrap_err();
        match err {
            ChatError::Transport(message) => assert!(message.starts_with("console output")),
            other => panic!("expected a transport error, got {other}"),
        }

        let mut buffer = Vec::new();
        write_to(&mut buffer, "hello\n").unwrap();
        assert_eq!(buffer, b"hello\n");
    }

    #[test]
    fn other_lines_become_commands_or_text() {
        let chat = ConsoleChat::new();
        assert_eq!(chat.parse_line("   "), None);
        assert_eq!(chat.parse_line("hello"), Some(Inbound::Text("hello".into())));
        assert_eq!(chat.parse_line("#tag"), Some(Inbound::Text("#tag".into())));
        assert_eq!(
            chat.parse_line("/start 12"),
            Some(Inbound::Command {
                name: "start".into(),
                args: "12".into()
            })
        );
    }
}
