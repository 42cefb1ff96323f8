//! Chat page served at `GET /chat`

use std::path::PathBuf;

use crate::error::Result;

/// Where the chat page HTML comes from
#[derive(Debug, Clone, Default)]
pub enum ChatPage {
    /// Page compiled into the binary
    #[default]
    Inline,
    /// HTML file read on every request, so edits show up without a restart
    File(PathBuf),
}

impl ChatPage {
    pub fn from_path(path: Option<&str>) -> Self {
        match path {
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::Inline,
        }
    }

    /// Load the page HTML
    pub async fn render(&self) -> Result<String> {
        match self {
            Self::Inline => Ok(CHAT_HTML.to_string()),
            Self::File(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

/// Built-in chat widget
pub const CHAT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Customer Support</title>
    <style>
        body { font-family: Arial; background: #f4f4f4; }
        .chat { max-width: 600px; margin: auto; background: white; padding: 20px; }
        .msg { margin: 10px 0; }
        .bot { color: green; }
        .user { color: blue; }
        .error { color: #b00020; }
    </style>
</head>
<body>
    <div class="chat">
        <h2>Customer Support</h2>
        <div id="messages"></div>
        <input id="msg" placeholder="Type your message..." style="width:80%">
        <button onclick="send()">Send</button>
    </div>

    <script>
        const session_id = "demo-session";

        function addLine(cls, label, text) {
            const line = document.createElement("div");
            line.className = "msg " + cls;
            const who = document.createElement("b");
            who.textContent = label + " ";
            line.appendChild(who);
            line.appendChild(document.createTextNode(text));
            document.getElementById("messages").appendChild(line);
        }

        function send() {
            const input = document.getElementById("msg");
            const msg = input.value;
            if (!msg.trim()) {
                return;
            }
            addLine("user", "You:", msg);
            input.value = "";

            fetch("/chat", {
                method: "POST",
                headers: { "Content-Type": "application/json" },
                body: JSON.stringify({
                    session_id: session_id,
                    user_input: msg
                })
            })
            .then(res => res.json())
            .then(data => {
                if (data.reply !== undefined) {
                    addLine("bot", "AI:", data.reply);
                } else {
                    addLine("error", "AI:", data.error || "Something went wrong.");
                }
            })
            .catch(() => addLine("error", "AI:", "Network error, please try again."));
        }

        document.getElementById("msg").addEventListener("keydown", e => {
            if (e.key === "Enter") {
                send();
            }
        });
    </script>
</body>
</html>
"#;
