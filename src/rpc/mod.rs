//! Per-call state machines.
//!
//! [CommonRpc] holds the state shared by both ends of a call: the inbound
//! payload queue, the completion flags, the cancellation latch and the
//! outbound writer. [ClientRpc] adds the initiation path, [ServerRpc] the
//! handler-dispatch path. The state object is reference counted; the
//! transport-facing dispatch side and the user-facing stream handle each keep
//! a clone, and the call lives as long as the longest holder.

mod client;
pub use client::ClientRpc;
mod server;
pub use server::ServerRpc;

use crate::packet::{CallData, Packet};
use crate::writer::ArcWriter;
use crossfire::{MAsyncRx, MTx, mpmc};
use futures::future::{Either, select};
use futures::pin_mut;
use starpc_core::error::RpcErr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cold call state, guarded by one mutex.
///
/// The inbound queue itself lives in an unbounded channel: payloads pushed
/// before `data_tx` is dropped are drained by the reader before it can
/// observe the closed state, which keeps completion ordered after data.
struct CallSt {
    writer: Option<ArcWriter>,
    data_tx: Option<MTx<Vec<u8>>>,
    close_tx: Option<MTx<()>>,
    data_closed: bool,
    remote_err: Option<RpcErr>,
    service: String,
    method: String,
}

/// State shared between the client and server side of an on-going call.
pub struct CommonRpc {
    st: Mutex<CallSt>,
    data_rx: MAsyncRx<Vec<u8>>,
    close_rx: MAsyncRx<()>,
    /// Set once this side has sent a terminal CallData or a CallCancel.
    local_completed: AtomicBool,
    /// One-way latch waking blocked readers.
    canceled: AtomicBool,
}

impl CommonRpc {
    pub(crate) fn new(service: &str, method: &str, writer: Option<ArcWriter>) -> Self {
        let (data_tx, data_rx) = mpmc::unbounded_async::<Vec<u8>>();
        let (close_tx, close_rx) = mpmc::unbounded_async::<()>();
        Self {
            st: Mutex::new(CallSt {
                writer,
                data_tx: Some(data_tx),
                close_tx: Some(close_tx),
                data_closed: false,
                remote_err: None,
                service: service.to_string(),
                method: method.to_string(),
            }),
            data_rx,
            close_rx,
            local_completed: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> String {
        self.st.lock().unwrap().service.clone()
    }

    pub fn method(&self) -> String {
        self.st.lock().unwrap().method.clone()
    }

    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn writer(&self) -> Option<ArcWriter> {
        self.st.lock().unwrap().writer.clone()
    }

    pub(crate) fn set_writer(&self, writer: ArcWriter) -> Result<(), RpcErr> {
        let mut st = self.st.lock().unwrap();
        if st.writer.is_some() {
            return Err(RpcErr::Completed);
        }
        st.writer = Some(writer);
        Ok(())
    }

    /// Set the cancellation latch and wake blocked readers. Does not touch
    /// the writer or the inbound queue.
    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        self.st.lock().unwrap().close_tx.take();
    }

    /// Blocks until one payload is available and returns it, in arrival
    /// order. Once the call terminates, returns the remote error, `Eof` for
    /// a clean remote completion, or `Canceled` when only the local latch
    /// fired; payloads queued before the terminal state are always drained
    /// first, and none are returned after.
    pub async fn read_one(&self) -> Result<Vec<u8>, RpcErr> {
        loop {
            if let Ok(data) = self.data_rx.try_recv() {
                return Ok(data);
            }
            {
                let st = self.st.lock().unwrap();
                if st.data_closed {
                    // data_tx is dropped under the same lock that sets
                    // data_closed, so one more drain catches a payload that
                    // raced in with the completion.
                    drop(st);
                    if let Ok(data) = self.data_rx.try_recv() {
                        return Ok(data);
                    }
                    return Err(self.remote_err_or_eof());
                }
            }
            if self.canceled.load(Ordering::Acquire) {
                // canceled locally while the remote is still open
                self.teardown().await;
                return Err(RpcErr::Canceled);
            }
            let data_fut = self.data_rx.recv();
            let close_fut = self.close_rx.recv();
            pin_mut!(data_fut);
            pin_mut!(close_fut);
            match select(data_fut, close_fut).await {
                Either::Left((Ok(data), _)) => return Ok(data),
                // queue closed or latch fired: re-check from the top
                Either::Left((Err(_), _)) => {}
                Either::Right(_) => {}
            }
        }
    }

    fn remote_err_or_eof(&self) -> RpcErr {
        self.st.lock().unwrap().remote_err.clone().unwrap_or(RpcErr::Eof)
    }

    /// Write one CallData packet carrying `data` and/or the completion
    /// marker. After this side completed, only the degenerate no-op
    /// (`complete` with nothing else) is accepted.
    pub async fn write_call_data(
        &self, data: Vec<u8>, data_is_zero: bool, complete: bool, err: Option<RpcErr>,
    ) -> Result<(), RpcErr> {
        if self.local_completed.load(Ordering::Acquire) {
            if complete && data.is_empty() && !data_is_zero {
                return Ok(());
            }
            return Err(RpcErr::Completed);
        }
        if complete || err.is_some() {
            self.local_completed.store(true, Ordering::Release);
        }
        let writer = match self.writer() {
            None => return Err(RpcErr::NilWriter),
            Some(w) => w,
        };
        writer.write_packet(Packet::call_data(data, data_is_zero, complete, err.as_ref())).await
    }

    /// Write a CallCancel packet; at most one terminal packet leaves this
    /// side, so a completed call returns `Completed` without writing.
    pub async fn write_call_cancel(&self) -> Result<(), RpcErr> {
        if self.local_completed.swap(true, Ordering::AcqRel) {
            return Err(RpcErr::Completed);
        }
        let writer = match self.writer() {
            None => return Err(RpcErr::NilWriter),
            Some(w) => w,
        };
        writer.write_packet(Packet::call_cancel()).await
    }

    /// Apply an incoming CallData packet: queue the payload when one is
    /// present (`data` non-empty or an explicit zero payload), record a
    /// remote error, and latch the read side closed on completion.
    pub fn handle_call_data(&self, pkt: CallData) -> Result<(), RpcErr> {
        let mut st = self.st.lock().unwrap();
        if st.data_closed {
            // a duplicate completion marker is ignored
            if pkt.complete {
                return Ok(());
            }
            return Err(RpcErr::Completed);
        }

        if !pkt.data.is_empty() || pkt.data_is_zero {
            if let Some(tx) = st.data_tx.as_ref() {
                let _ = tx.send(pkt.data);
            }
        }

        let mut complete = pkt.complete;
        if !pkt.error.is_empty() {
            complete = true;
            st.remote_err = Some(RpcErr::from_remote(&pkt.error));
        }

        if complete {
            st.data_closed = true;
            st.data_tx.take();
        }
        Ok(())
    }

    /// An incoming CallCancel aborts the call from the remote side.
    pub async fn handle_call_cancel(&self) -> Result<(), RpcErr> {
        self.handle_stream_close(Some(RpcErr::Canceled)).await;
        Ok(())
    }

    /// The transport under this call closed, with an optional error.
    pub async fn handle_stream_close(&self, close_err: Option<RpcErr>) {
        let writer = {
            let mut st = self.st.lock().unwrap();
            if let Some(e) = close_err {
                if st.remote_err.is_none() {
                    st.remote_err = Some(e);
                }
            }
            st.data_closed = true;
            st.data_tx.take();
            st.close_tx.take();
            st.writer.clone()
        };
        self.canceled.store(true, Ordering::Release);
        if let Some(w) = writer {
            let _ = w.close().await;
        }
    }

    /// Close only the read side: no more inbound payloads will be queued,
    /// but the writer stays usable so an in-flight handler can still emit
    /// its terminal packet.
    pub(crate) fn close_read(&self, close_err: Option<RpcErr>) {
        let mut st = self.st.lock().unwrap();
        if st.data_closed {
            return;
        }
        if let Some(e) = close_err {
            if st.remote_err.is_none() {
                st.remote_err = Some(e);
            }
        }
        st.data_closed = true;
        st.data_tx.take();
    }

    /// Release everything held by the call: latch both completion flags,
    /// record `Canceled` if no remote error arrived first, close the writer
    /// and wake any waiter.
    pub(crate) async fn teardown(&self) {
        let writer = {
            let mut st = self.st.lock().unwrap();
            st.data_closed = true;
            st.data_tx.take();
            st.close_tx.take();
            if st.remote_err.is_none() {
                st.remote_err = Some(RpcErr::Canceled);
            }
            st.writer.take()
        };
        self.local_completed.store(true, Ordering::Release);
        self.canceled.store(true, Ordering::Release);
        if let Some(w) = writer {
            let _ = w.close().await;
        }
    }

    /// Record the ids and the first payload of an incoming CallStart.
    /// A second CallStart, or one arriving after the call closed, is
    /// rejected with `Completed`.
    pub(crate) fn accept_call_start(
        &self, service: &str, method: &str, data: Vec<u8>, data_is_zero: bool,
    ) -> Result<(), RpcErr> {
        let mut st = self.st.lock().unwrap();
        if !st.service.is_empty() || !st.method.is_empty() {
            return Err(RpcErr::Completed);
        }
        if st.data_closed {
            return Err(RpcErr::Completed);
        }
        st.service = service.to_string();
        st.method = method.to_string();
        if !data.is_empty() || data_is_zero {
            if let Some(tx) = st.data_tx.as_ref() {
                let _ = tx.send(data);
            }
        }
        Ok(())
    }

    /// Resolves once the call is torn down (latch set by either side).
    pub async fn wait(&self) {
        while self.close_rx.recv().await.is_ok() {}
    }
}
