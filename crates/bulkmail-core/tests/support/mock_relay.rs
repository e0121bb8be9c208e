//! Scripted SMTP relay for exercising real relay sessions

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// How the relay answers
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Answer AUTH with 535
    pub reject_auth: bool,
    /// Advertise STARTTLS in the EHLO reply; the upgrade itself is refused
    pub advertise_starttls: bool,
    /// Answer RCPT with 550 when the address contains this text
    pub reject_rcpt: Option<String>,
    /// Hang up on RCPT when the address contains this text
    pub drop_on_rcpt: Option<String>,
}

#[derive(Default)]
struct Journal {
    commands: Vec<String>,
    messages: Vec<String>,
}

/// A relay listening on an ephemeral localhost port
pub struct MockRelay {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    journal: Arc<Mutex<Journal>>,
}

impl MockRelay {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let journal = Arc::new(Mutex::new(Journal::default()));
        let behaviour = Arc::new(behaviour);

        {
            let connections = Arc::clone(&connections);
            let journal = Arc::clone(&journal);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let journal = Arc::clone(&journal);
                    let behaviour = Arc::clone(&behaviour);
                    tokio::spawn(async move {
                        let _ = serve(stream, &behaviour, &journal).await;
                    });
                }
            });
        }

        Self {
            addr,
            connections,
            journal,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.journal.lock().unwrap().commands.clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.journal.lock().unwrap().messages.clone()
    }
}

async fn serve(
    stream: TcpStream,
    behaviour: &Behaviour,
    journal: &Mutex<Journal>,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut line = String::new();

    write.write_all(b"220 mock.relay ESMTP ready\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let command = line.trim_end().to_string();
        journal.lock().unwrap().commands.push(command.clone());
        let upper = command.to_ascii_uppercase();

        let reply: &[u8] = if upper.starts_with("EHLO") {
            if behaviour.advertise_starttls {
                b"250-mock.relay\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n"
            } else {
                b"250-mock.relay\r\n250-8BITMIME\r\n250 AUTH PLAIN LOGIN\r\n"
            }
        } else if upper == "STARTTLS" {
            b"454 4.7.0 TLS not available due to temporary reason\r\n"
        } else if upper.starts_with("AUTH") {
            if behaviour.reject_auth {
                b"535 5.7.8 Authentication credentials invalid\r\n"
            } else {
                b"235 2.7.0 Authentication successful\r\n"
            }
        } else if upper.starts_with("MAIL FROM") {
            b"250 2.1.0 Ok\r\n"
        } else if upper.starts_with("RCPT TO") {
            let matches = |needle: &Option<String>| {
                needle.as_deref().is_some_and(|n| command.contains(n))
            };
            if matches(&behaviour.drop_on_rcpt) {
                return Ok(());
            }
            if matches(&behaviour.reject_rcpt) {
                b"550 5.1.1 User unknown\r\n"
            } else {
                b"250 2.1.5 Ok\r\n"
            }
        } else if upper == "DATA" {
            write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
            let mut body = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" {
                    break;
                }
                body.push_str(&line);
            }
            journal.lock().unwrap().messages.push(body);
            b"250 2.0.0 Ok: queued\r\n"
        } else if upper == "RSET" {
            b"250 2.0.0 Ok\r\n"
        } else if upper == "QUIT" {
            write.write_all(b"221 2.0.0 Bye\r\n").await?;
            return Ok(());
        } else {
            b"502 5.5.2 Command not recognized\r\n"
        };

        write.write_all(reply).await?;
    }
}
