// Terminal front-end for the chat session. Drives the same ChatService as the web UI.

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::session::{ChatService, Event, TurnOutcome};
use crate::settings::{Model, Temperature};

#[derive(Debug, PartialEq)]
enum Command {
    Send(String),
    Apply(Event),
    Model(String),
    Temperature(String),
    Status,
    Quit,
    Help,
}

fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let Some(rest) = line.trim().strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };
    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let arg = arg.trim().to_string();
    Some(match name {
        "reset" | "clear" => Command::Apply(Event::Reset),
        "model" => Command::Model(arg),
        "temperature" | "temp" => Command::Temperature(arg),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        _ => Command::Help,
    })
}

const HELP: &str = "commands: /reset, /model <gpt-4o|gpt-4o-mini|gpt-4-turbo>, /temperature <0.0-2.0>, /status, /quit";

/// Runs an interactive chat until EOF or `/quit`.
pub async fn run_terminal_chat<R, W>(service: &ChatService, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let ChatService::Halted { notice } = service {
        return Err(anyhow!("{}", notice.message));
    }

    info!("Starting terminal chat session");
    let view = service.peek().await;
    output
        .write_all(
            format!(
                "{} ({}, temperature {}). {}\n",
                view.title, view.status.model, view.settings.temperature_label, HELP
            )
            .as_bytes(),
        )
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"you> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(command) = parse_line(&line) else {
            continue;
        };

        let reply = match command {
            Command::Quit => break,
            Command::Help => HELP.to_string(),
            Command::Status => {
                let view = service.peek().await;
                format!(
                    "{} | messages: {} | model: {} | temperature: {}",
                    view.status.connection,
                    view.status.message_count,
                    view.status.model,
                    view.settings.temperature_label
                )
            }
            Command::Send(text) => match service.submit(&text).await? {
                TurnOutcome::Replied(text) => format!("assistant> {text}"),
                TurnOutcome::Failed(notice) => notice,
                TurnOutcome::Ignored | TurnOutcome::Discarded => continue,
            },
            Command::Apply(event) => {
                service.handle(event).await?;
                "Conversation cleared.".to_string()
            }
            Command::Model(model) => match model.parse::<Model>() {
                Ok(model) => {
                    service.set_model(model).await?;
                    settings_line(service).await
                }
                Err(e) => format!("Error: {e}"),
            },
            Command::Temperature(temperature) => match temperature.parse::<Temperature>() {
                Ok(temperature) => {
                    service.set_temperature(temperature).await?;
                    settings_line(service).await
                }
                Err(e) => format!("Error: {e}"),
            },
        };

        // The notice has been shown on the terminal; don't replay it later
        service.snapshot().await;
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    info!("Terminal chat session finished");
    Ok(())
}

async fn settings_line(service: &ChatService) -> String {
    let view = service.peek().await;
    format!(
        "Using {} at temperature {}.",
        view.status.model, view.settings.temperature_label
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::gateway::CompletionGateway;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("hello there\n"), Some(Command::Send("hello there".into())));
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("/reset"), Some(Command::Apply(Event::Reset)));
        assert_eq!(parse_line("/model gpt-4o-mini"), Some(Command::Model("gpt-4o-mini".into())));
        assert_eq!(parse_line("/temp 1.5"), Some(Command::Temperature("1.5".into())));
        assert_eq!(parse_line("/quit"), Some(Command::Quit));
        assert_eq!(parse_line("/whatever"), Some(Command::Help));
    }

    #[tokio::test]
    async fn test_terminal_chat_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello from the model"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = ChatService::new(CompletionGateway::new("sk-test", &server.uri()));
        let input: &[u8] = b"/model gpt-4-turbo\nHi\n/status\n/quit\nnever sent\n";
        let mut output = Vec::new();
        run_terminal_chat(&service, input, &mut output).await.unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Using GPT-4 Turbo at temperature 0.0."));
        assert!(printed.contains("assistant> Hello from the model"));
        assert!(printed.contains("messages: 2 | model: GPT-4 Turbo"));
    }

    #[tokio::test]
    async fn test_terminal_chat_reports_failures_and_bad_settings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
            .mount(&server)
            .await;

        let service = ChatService::new(CompletionGateway::new("sk-test", &server.uri()));
        let input: &[u8] = b"Hi\n/temperature lukewarm\n/model gpt-2\n/temperature 1.5\n";
        let mut output = Vec::new();
        run_terminal_chat(&service, input, &mut output).await.unwrap();

        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Error: completion API returned 500 Internal Server Error: upstream broke"));
        assert!(printed.contains("Error: temperature must be a number"));
        assert!(printed.contains("Error: unknown model 'gpt-2'"));
        assert!(printed.contains("Using GPT-4o at temperature 1.5."));
        assert_eq!(service.peek().await.status.message_count, 1);
    }

    #[tokio::test]
    async fn test_terminal_chat_refuses_halted_session() {
        let service = ChatService::from_config(&Config::new(None, "http://127.0.0.1:9"));
        let input: &[u8] = b"Hi\n";
        let err = run_terminal_chat(&service, input, Vec::new()).await.unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY not found"));
    }
}
