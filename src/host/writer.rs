//! Outbound writer thread

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

use super::link::HostLink;
use super::queue::{CommandQueue, PendingCommand};

/// Spawn the thread draining `queue` into `link`
pub fn spawn(queue: Arc<CommandQueue>, link: Arc<HostLink>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("host-writer".into())
        .spawn(move || run(&queue, &link))
}

fn run(queue: &CommandQueue, link: &HostLink) {
    debug!("Host writer started");
    loop {
        let mut line = match queue.pop() {
            PendingCommand::Terminate => break,
            PendingCommand::Line(line) => line,
        };
        if !line.ends_with('\n') {
            line.push('\n');
        }
        match link.write_line(&line) {
            Ok(true) => trace!("Sent to host: {}", line.trim_end()),
            Ok(false) => trace!("Not connected, dropped: {}", line.trim_end()),
            Err(e) => debug!("Write to host failed, dropped {}: {}", line.trim_end(), e),
        }
    }
    debug!("Host writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn test_writer_appends_newline_and_exits_on_terminate() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let queue = Arc::new(CommandQueue::new());
        let link = Arc::new(HostLink::new());
        link.attach(client).unwrap();

        let handle = spawn(queue.clone(), link).unwrap();
        queue.push("Exposure 10");
        queue.push("Contrast 20\n");

        let mut reader = BufReader::new(server);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "Exposure 10\n");
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "Contrast 20\n");

        queue.terminate();
        handle.join().unwrap();
    }

    #[test]
    fn test_writer_drops_while_disconnected() {
        let queue = Arc::new(CommandQueue::new());
        let handle = spawn(queue.clone(), Arc::new(HostLink::new())).unwrap();
        queue.push("Exposure 10\n");
        queue.push("Exposure 11\n");
        // give the writer time to consume both
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(queue.is_empty());
        queue.terminate();
        handle.join().unwrap();
    }
}
