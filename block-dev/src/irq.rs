use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use spin::Mutex;

use crate::IrqHandler;

/// 模拟的中断线。
///
/// 每个请求经由 [`IrqLine::raise`] 排入中断线程，
/// 中断线程在模拟的传输延迟之后调用登记的处理函数。
/// 中断线随设备一同销毁。
pub struct IrqLine {
    sender: Sender<()>,
    handler: Arc<Mutex<Option<IrqHandler>>>,
    /// 设备上是否有未完成的请求
    busy: Arc<AtomicBool>,
}

impl IrqLine {
    pub fn new(latency: Duration) -> Self {
        let (sender, receiver) = mpsc::channel::<()>();
        let handler: Arc<Mutex<Option<IrqHandler>>> = Arc::default();
        let busy = Arc::new(AtomicBool::new(false));

        {
            let handler = handler.clone();
            let busy = busy.clone();
            thread::Builder::new()
                .name("disk-irq".into())
                .spawn(move || {
                    for () in receiver {
                        if !latency.is_zero() {
                            thread::sleep(latency);
                        }
                        // 先让设备空闲，再通知等候者
                        busy.store(false, Ordering::Release);

                        let handler = handler.lock().clone();
                        match handler {
                            Some(handler) => handler(),
                            None => log::warn!("disk interrupt dropped: no handler"),
                        }
                    }
                })
                .expect("failed to spawn disk interrupt thread");
        }

        Self {
            sender,
            handler,
            busy,
        }
    }

    pub fn set_handler(&self, handler: IrqHandler) {
        *self.handler.lock() = Some(handler);
    }

    /// 标记设备开始一次传输。设备同一时刻只接受一个请求。
    pub fn start(&self) {
        assert!(
            !self.busy.swap(true, Ordering::AcqRel),
            "block device accepts only one outstanding request"
        );
    }

    /// 传输已完成，排入一次中断
    pub fn raise(&self) {
        // 中断线程随发送端存活，发送不会失败
        let _ = self.sender.send(());
    }
}
