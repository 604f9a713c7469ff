// GestureGate - Transport Reader Task
//
// Owns the read half of the serial link. Decodes newline-delimited lines and
// forwards them to the acquisition loop. Open failures and read errors are
// reported as events; the link is then closed and re-opened after the
// configured delay.

use std::io::{self, BufRead, BufReader, Read};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::drivers::serial::SerialLink;
use crate::events::TransportEvent;

/// Why `read_lines` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEnd {
    /// The device side hung up.
    Eof,
    /// Nobody is listening for events any more.
    ChannelClosed,
}

/// Forward every line from `reader` as a `TransportEvent::Line`. Bytes that
/// are not valid UTF-8 are replaced rather than failing the stream.
pub fn read_lines<R: Read>(reader: R, events_tx: &Sender<TransportEvent>) -> io::Result<ReadEnd> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(64);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(ReadEnd::Eof);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        if events_tx.send(TransportEvent::Line(line)).is_err() {
            return Ok(ReadEnd::ChannelClosed);
        }
    }
}

pub fn reader_task(link: SerialLink, events_tx: Sender<TransportEvent>) {
    log::info!("Reader task started");

    let port = link.config().port.clone();
    let retry = Duration::from_millis(link.config().reconnect_ms);

    loop {
        let event = match link.open() {
            Ok(reader) => {
                if events_tx.send(TransportEvent::Opened(port.clone())).is_err() {
                    break;
                }
                let end = read_lines(reader, &events_tx);
                link.close();
                match end {
                    Ok(ReadEnd::Eof) => TransportEvent::Closed,
                    Ok(ReadEnd::ChannelClosed) => break,
                    Err(e) => TransportEvent::Error(format!("read error on {port}: {e}")),
                }
            }
            Err(e) => TransportEvent::Error(format!("cannot open {port}: {e}")),
        };

        if events_tx.send(event).is_err() {
            break;
        }
        thread::sleep(retry);
    }

    link.close();
    log::warn!("Event channel closed - exiting reader task");
}
