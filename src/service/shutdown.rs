// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tokio::sync::broadcast;

/// Server shutdown signal as seen by one task.
///
/// Every long running task (accept loop, session read loops, heart wheel
/// driver) holds one of these. The receiver is dropped once the signal was
/// seen; a lagged or closed channel counts as the signal.
#[derive(Debug)]
pub struct Shutdown {
    notify: Option<broadcast::Receiver<()>>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            notify: Some(notify),
        }
    }

    pub fn subscribe(sender: &broadcast::Sender<()>) -> Shutdown {
        Shutdown::new(sender.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        self.notify.is_none()
    }

    /// Resolves on the signal, and right away on every later call.
    pub async fn recv(&mut self) {
        if let Some(notify) = self.notify.as_mut() {
            let _ = notify.recv().await;
            self.notify = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_after_signal() {
        let (notify, _) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(notify.subscribe());
        assert!(!shutdown.is_shutdown());

        notify.send(()).unwrap();
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());

        // already shut down, returns immediately
        shutdown.recv().await;
    }

    #[tokio::test]
    async fn test_each_subscriber_sees_the_signal() {
        let (notify, _) = broadcast::channel(1);
        let mut read_loop = Shutdown::subscribe(&notify);
        let mut driver = Shutdown::subscribe(&notify);

        notify.send(()).unwrap();
        read_loop.recv().await;
        driver.recv().await;
        assert!(read_loop.is_shutdown() && driver.is_shutdown());
    }

    #[tokio::test]
    async fn test_sender_dropped() {
        let (notify, _) = broadcast::channel::<()>(1);
        let mut shutdown = Shutdown::new(notify.subscribe());
        drop(notify);
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
