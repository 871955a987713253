//! Single-page chat UI served at `/`

pub const CHAT_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>SQLite Chat</title>
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            background: #0f172a;
            color: #e2e8f0;
            padding: 20px;
        }

        .container {
            max-width: 1400px;
            margin: 0 auto;
            display: grid;
            grid-template-columns: 2fr 1fr;
            gap: 20px;
        }

        header { grid-column: 1 / -1; border-bottom: 2px solid #1e293b; padding-bottom: 12px; }
        h1 { font-size: 1.8rem; color: #93c5fd; }
        h2 { font-size: 1.1rem; color: #94a3b8; margin-bottom: 10px; }

        .panel {
            background: #1e293b;
            border: 1px solid #334155;
            border-radius: 12px;
            padding: 16px;
        }

        #chat {
            height: 60vh;
            overflow-y: auto;
            display: flex;
            flex-direction: column;
            gap: 10px;
            margin-bottom: 12px;
        }

        .msg { padding: 10px 14px; border-radius: 10px; white-space: pre-wrap; max-width: 85%; }
        .msg.user { background: #1d4ed8; align-self: flex-end; }
        .msg.assistant { background: #334155; align-self: flex-start; }

        form { display: flex; gap: 8px; }
        textarea {
            flex: 1;
            background: #0f172a;
            color: #e2e8f0;
            border: 1px solid #334155;
            border-radius: 8px;
            padding: 8px;
            resize: vertical;
        }
        button {
            background: #3b82f6;
            color: white;
            border: none;
            border-radius: 8px;
            padding: 8px 16px;
            cursor: pointer;
        }
        button.secondary { background: #475569; }
        button:disabled { opacity: 0.5; cursor: wait; }

        .interaction { border-bottom: 1px solid #334155; padding: 8px 0; font-size: 0.9rem; }
        .interaction.error { color: #fca5a5; }
        .interaction .meta { color: #94a3b8; font-size: 0.8rem; }
        .status { color: #94a3b8; font-size: 0.85rem; margin-top: 6px; min-height: 1em; }
    </style>
</head>
<body>
    <div class="container">
        <header><h1>SQLite Chat</h1></header>

        <div class="panel">
            <div id="chat"></div>
            <form id="chat-form">
                <textarea id="message" rows="2" placeholder="Ask about the people table..."></textarea>
                <button type="submit" id="send">Submit</button>
                <button type="button" id="clear" class="secondary">Clear</button>
            </form>
            <div class="status" id="status"></div>
        </div>

        <div class="panel">
            <h2>Recent interactions</h2>
            <div id="recent"></div>
        </div>
    </div>

    <script>
        let sessionId = sessionStorage.getItem('sqlmcp-session');
        if (!sessionId) {
            sessionId = (crypto.randomUUID && crypto.randomUUID()) || String(Date.now());
            sessionStorage.setItem('sqlmcp-session', sessionId);
        }

        function renderHistory(history) {
            const chat = document.getElementById('chat');
            chat.innerHTML = '';
            for (const m of history) {
                const div = document.createElement('div');
                div.className = `msg ${m.role}`;
                div.textContent = m.content;
                chat.appendChild(div);
            }
            chat.scrollTop = chat.scrollHeight;
        }

        function setStatus(text) {
            document.getElementById('status').textContent = text;
        }

        async function post(path, body) {
            const res = await fetch(path, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify(body),
            });
            if (!res.ok) throw new Error(`HTTP ${res.status}`);
            return res.json();
        }

        async function refreshRecent() {
            try {
                const res = await fetch('/api/interactions/html');
                document.getElementById('recent').innerHTML = await res.text();
            } catch (err) {
                setStatus(`Failed to load interactions: ${err.message}`);
            }
        }

        document.getElementById('chat-form').addEventListener('submit', async (e) => {
            e.preventDefault();
            const input = document.getElementById('message');
            const message = input.value.trim();
            if (!message) return;
            const send = document.getElementById('send');
            send.disabled = true;
            setStatus('Thinking...');
            try {
                const data = await post('/api/chat', { message, session_id: sessionId });
                input.value = '';
                renderHistory(data.history);
                document.getElementById('recent').innerHTML = data.recent_html;
                setStatus(`Answered in ${data.elapsed_secs.toFixed(2)}s`);
            } catch (err) {
                setStatus(`Request failed: ${err.message}`);
            } finally {
                send.disabled = false;
            }
        });

        document.getElementById('clear').addEventListener('click', async () => {
            try {
                const data = await post('/api/clear', { session_id: sessionId });
                renderHistory(data.history);
                document.getElementById('recent').innerHTML = data.recent_html;
                setStatus('');
            } catch (err) {
                setStatus(`Clear failed: ${err.message}`);
            }
        });

        refreshRecent();
    </script>
</body>
</html>
"#;
