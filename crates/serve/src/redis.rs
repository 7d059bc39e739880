//! RESP session machine
//!
//! Commands (matched in any case):
//!
//! - `LS` - the text snapshot of `/meta/nouns`, one array element per line
//! - `GET <name> [<format>]` - snapshot; text replies as an array of lines,
//!   anything else as one bulk value
//! - `WATCH <name> [<format>]` - record the pair in the session's watch set,
//!   reply `+OK`; streaming starts at MONITOR
//! - `MONITOR [<name> <format>]...` - append pairs, then stream every
//!   watched source multiplexed into this connection. No `+OK` so clients
//!   can parse a pure stream.
//!
//! Unknown commands get an error reply and the connection continues; names
//! starting with `_` are reserved hooks and ignored. Any other handler error
//! is written back as an error frame and closes the connection, which also
//! stops the monitor and destroys the session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scry_meta::NOUNS_NAME;
use scry_resp::{RespReader, RespValue, RespWriter};
use scry_source::{DataSource, DataSources, ItemWatcher, WatchSink};

use crate::chan_buf::ChunkBuf;
use crate::item_buf::ItemBuf;

/// Format used when a RESP command names none
const DEFAULT_RESP_FORMAT: &str = "text";

type Args = std::vec::IntoIter<RespValue>;
type SharedWriter<W> = Arc<Mutex<RespWriter<W>>>;

/// Per-connection session state, created on first use and destroyed when the
/// connection ends.
struct Session {
    /// watch-name to format
    watches: HashMap<String, String>,
    /// one-shot stop signal for the monitor pump
    stop: CancellationToken,
}

impl Session {
    fn new() -> Self {
        Self {
            watches: HashMap::new(),
            stop: CancellationToken::new(),
        }
    }
}

enum SessionError {
    /// Reply with an error frame, then close the connection
    Command(String),
    /// The connection is gone; just close
    Closed,
}

impl From<scry_resp::RespError> for SessionError {
    fn from(_: scry_resp::RespError) -> Self {
        SessionError::Closed
    }
}

/// Run the RESP command loop on one connection until the peer disconnects
/// or a command fails.
pub async fn serve_resp_connection<S>(stream: S, sources: Arc<DataSources>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = RespReader::new(BufReader::new(read_half));
    let writer: SharedWriter<WriteHalf<S>> = Arc::new(Mutex::new(RespWriter::new(write_half)));
    let mut session: Option<Session> = None;

    loop {
        match reader.read_value().await {
            Ok(None) => break,
            Ok(Some(value)) => {
                match handle_value(&sources, &writer, &mut session, value).await {
                    Ok(()) => {}
                    Err(SessionError::Command(message)) => {
                        let mut writer = writer.lock().await;
                        let _ = writer.write_error(&message).await;
                        break;
                    }
                    Err(SessionError::Closed) => break,
                }
            }
            Err(err) => {
                debug!(error = %err, "resp protocol error");
                let mut writer = writer.lock().await;
                let _ = writer.write_error(&err.to_string()).await;
                break;
            }
        }
    }

    // end of session: stop any monitor pump and drop the watch set
    if let Some(session) = session.take() {
        session.stop.cancel();
    }
}

async fn handle_value<W>(
    sources: &Arc<DataSources>,
    writer: &SharedWriter<W>,
    session: &mut Option<Session>,
    value: RespValue,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let RespValue::Array(items) = value else {
        return Err(SessionError::Command(
            "unexpected RESP value, expected a command array".into(),
        ));
    };
    let mut args = items.into_iter();
    let command = match args.next() {
        Some(value) => value
            .as_text()
            .ok_or_else(|| SessionError::Command("expected command string".into()))?,
        None => return Err(SessionError::Command("empty command array".into())),
    };
    let command = command.to_ascii_lowercase();

    match command.as_str() {
        "ls" => handle_ls(sources, writer, args).await,
        "get" => handle_get(sources, writer, args).await,
        "watch" => handle_watch(sources, writer, session, args).await,
        "monitor" => handle_monitor(sources, writer, session, args).await,
        _ if command.starts_with('_') => Ok(()),
        _ => {
            let mut writer = writer.lock().await;
            writer
                .write_error(&format!("unimplemented command {command:?}"))
                .await?;
            Ok(())
        }
    }
}

fn take_text(args: &mut Args, what: &str) -> Result<String, SessionError> {
    match args.next() {
        None => Err(SessionError::Command(format!("missing {what} argument"))),
        Some(value) => value
            .as_text()
            .ok_or_else(|| SessionError::Command(format!("{what} argument not a string"))),
    }
}

fn take_format(args: &mut Args) -> Result<String, SessionError> {
    if args.len() == 0 {
        return Ok(DEFAULT_RESP_FORMAT.to_owned());
    }
    Ok(take_text(args, "format")?.to_ascii_lowercase())
}

fn expect_done(args: &Args, command: &str) -> Result<(), SessionError> {
    if args.len() > 0 {
        return Err(SessionError::Command(format!(
            "too many arguments to {command}"
        )));
    }
    Ok(())
}

fn resolve_source(
    sources: &DataSources,
    name: &str,
) -> Result<Arc<dyn DataSource>, SessionError> {
    sources
        .get_insensitive(name)
        .ok_or_else(|| SessionError::Command("no such data source".into()))
}

async fn handle_ls<W>(
    sources: &Arc<DataSources>,
    writer: &SharedWriter<W>,
    args: Args,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    expect_done(&args, "ls")?;
    let meta = resolve_source(sources, NOUNS_NAME)?;
    write_get(writer, meta, DEFAULT_RESP_FORMAT).await
}

async fn handle_get<W>(
    sources: &Arc<DataSources>,
    writer: &SharedWriter<W>,
    mut args: Args,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    let name = take_text(&mut args, "name")?;
    let source = resolve_source(sources, &name)?;
    let format = take_format(&mut args)?;
    expect_done(&args, "get")?;
    write_get(writer, source, &format).await
}

async fn write_get<W>(
    writer: &SharedWriter<W>,
    source: Arc<dyn DataSource>,
    format: &str,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = Vec::new();
    source
        .get(format, &mut buf)
        .map_err(|err| SessionError::Command(err.to_string()))?;

    let mut writer = writer.lock().await;
    match format {
        "text" => {
            let lines = complete_lines(&buf);
            writer.write_array_header(lines.len()).await?;
            for line in lines {
                writer.write_simple_bytes(line).await?;
            }
        }
        _ => writer.write_bulk_bytes(&buf).await?,
    }
    Ok(())
}

async fn handle_watch<W>(
    sources: &Arc<DataSources>,
    writer: &SharedWriter<W>,
    session: &mut Option<Session>,
    mut args: Args,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send,
{
    let session = session.get_or_insert_with(Session::new);
    let name = take_text(&mut args, "name")?;
    let source = resolve_source(sources, &name)?;
    let format = take_format(&mut args)?;
    expect_done(&args, "watch")?;

    session.watches.insert(source.name().to_owned(), format);
    writer.lock().await.write_simple_string("OK").await?;
    Ok(())
}

async fn handle_monitor<W>(
    sources: &Arc<DataSources>,
    writer: &SharedWriter<W>,
    session: &mut Option<Session>,
    mut args: Args,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = session.get_or_insert_with(Session::new);

    while args.len() > 0 {
        let name = take_text(&mut args, "name")?;
        let source = resolve_source(sources, &name)?;
        let format = take_format(&mut args)?;
        session.watches.insert(source.name().to_owned(), format);
    }

    if session.watches.is_empty() {
        return Err(SessionError::Command(
            "no watches set, monitor likely to be uninteresting".into(),
        ));
    }

    let watches: Vec<(String, String)> = session
        .watches
        .iter()
        .map(|(name, format)| (name.clone(), format.clone()))
        .collect();
    tokio::spawn(run_monitor(
        Arc::clone(sources),
        Arc::clone(writer),
        watches,
        session.stop.clone(),
    ));

    // no OK reply: from here the connection carries a pure stream
    Ok(())
}

/// The monitor pump: one buffer per watched source, multiplexed into the
/// connection with per-source framing. Exits on the session stop signal or
/// any write error, closing every buffer.
async fn run_monitor<W>(
    sources: Arc<DataSources>,
    writer: SharedWriter<W>,
    watches: Vec<(String, String)>,
    stop: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let capacity = watches.len().max(1);
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<usize>(capacity);
    let (item_tx, mut item_rx) = mpsc::channel::<usize>(capacity);

    let mut chunk_subs: Vec<(Arc<ChunkBuf<usize>>, String, String)> = Vec::new();
    let mut item_subs: Vec<(Arc<ItemBuf<usize>>, String, String)> = Vec::new();

    for (name, format) in &watches {
        let Some(source) = sources.get_insensitive(name) else {
            continue;
        };
        if let Some(item_source) = source.as_item_source() {
            let buf = Arc::new(ItemBuf::new(item_tx.clone(), item_subs.len()));
            if let Err(err) = item_source.watch_items(format, buf.clone()) {
                debug!(source = name.as_str(), error = %err, "monitor watch failed");
            }
            item_subs.push((buf, name.clone(), format.clone()));
        } else {
            let buf = Arc::new(ChunkBuf::new(chunk_tx.clone(), chunk_subs.len()));
            if let Err(err) = source.watch(format, buf.clone()) {
                debug!(source = name.as_str(), error = %err, "monitor watch failed");
            }
            chunk_subs.push((buf, name.clone(), format.clone()));
        }
    }

    let single = watches.len() == 1;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            index = chunk_rx.recv() => match index {
                Some(index) => {
                    let (buf, name, format) = &chunk_subs[index];
                    if write_chunk(&writer, buf, name, format, single).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            index = item_rx.recv() => match index {
                Some(index) => {
                    let (buf, name, format) = &item_subs[index];
                    if write_items(&writer, buf, name, format, single).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    for (buf, _, _) in &chunk_subs {
        let _ = buf.close();
    }
    for (buf, _, _) in &item_subs {
        let _ = buf.close();
    }
}

async fn write_items<W>(
    writer: &SharedWriter<W>,
    buf: &ItemBuf<usize>,
    name: &str,
    format: &str,
    single: bool,
) -> scry_resp::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let items = buf.drain();
    if items.is_empty() {
        return Ok(());
    }
    let mut writer = writer.lock().await;

    if single {
        match format {
            "text" => {
                for item in &items {
                    writer.write_simple_bytes(item).await?;
                }
            }
            _ => {
                for item in &items {
                    writer.write_bulk_bytes(item).await?;
                }
            }
        }
    } else {
        match format {
            "text" => {
                for item in &items {
                    let mut line = Vec::with_capacity(name.len() + 2 + item.len());
                    line.extend_from_slice(name.as_bytes());
                    line.extend_from_slice(b"> ");
                    line.extend_from_slice(item);
                    writer.write_simple_bytes(&line).await?;
                }
            }
            "json" => {
                for item in &items {
                    writer.write_bulk_bytes(&wrap_multi_json(name, item)).await?;
                }
            }
            _ => {
                for item in &items {
                    writer.write_array_header(2).await?;
                    writer.write_simple_string(name).await?;
                    writer.write_bulk_bytes(item).await?;
                }
            }
        }
    }
    Ok(())
}

async fn write_chunk<W>(
    writer: &SharedWriter<W>,
    buf: &ChunkBuf<usize>,
    name: &str,
    format: &str,
    single: bool,
) -> scry_resp::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let data = buf.drain();
    if data.is_empty() {
        return Ok(());
    }
    let mut writer = writer.lock().await;

    match format {
        "text" => {
            for line in complete_lines(&data) {
                if single {
                    writer.write_simple_bytes(line).await?;
                } else {
                    let mut prefixed = Vec::with_capacity(name.len() + 2 + line.len());
                    prefixed.extend_from_slice(name.as_bytes());
                    prefixed.extend_from_slice(b"> ");
                    prefixed.extend_from_slice(line);
                    writer.write_simple_bytes(&prefixed).await?;
                }
            }
        }
        "json" => {
            for line in complete_lines(&data) {
                if line.is_empty() {
                    continue;
                }
                if single {
                    writer.write_bulk_bytes(line).await?;
                } else {
                    writer.write_bulk_bytes(&wrap_multi_json(name, line)).await?;
                }
            }
        }
        _ => {
            if single {
                writer.write_bulk_bytes(&data).await?;
            } else {
                writer.write_array_header(2).await?;
                writer.write_simple_string(name).await?;
                writer.write_bulk_bytes(&data).await?;
            }
        }
    }
    Ok(())
}

/// Split framed stream bytes into lines, dropping the empty tail a trailing
/// newline produces.
fn complete_lines(data: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = data.split(|byte| *byte == b'\n').collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

/// Wrap one source's raw JSON record for a multi-source stream:
/// `{"name":<src>,"data":<raw-json>}`.
fn wrap_multi_json(name: &str, raw: &[u8]) -> Vec<u8> {
    let quoted = serde_json::to_vec(name).unwrap_or_else(|_| format!("{name:?}").into_bytes());
    let mut out = Vec::with_capacity(raw.len() + quoted.len() + 18);
    out.extend_from_slice(b"{\"name\":");
    out.extend_from_slice(&quoted);
    out.extend_from_slice(b",\"data\":");
    out.extend_from_slice(raw);
    out.push(b'}');
    out
}

#[cfg(test)]
#[path = "redis_test.rs"]
mod tests;
