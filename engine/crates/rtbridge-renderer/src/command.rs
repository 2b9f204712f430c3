use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use rtbridge_render_interface::debug_bridge::RawDebugCallback;
use rtbridge_render_interface::error::{BridgeError, BridgeResult};
use rtbridge_render_interface::handles::CameraId;
use rtbridge_render_interface::render_target::RenderTargetDesc;

use crate::param_sync::FrameParams;

/// 宿主每帧获取一个，交给自己的渲染循环；渲染上下文处理到它时执行这一帧的光线追踪
///
/// `camera` 为 None 时追踪所有已经绑定渲染目标的相机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameEventToken {
    frame_id: u64,
    camera: Option<CameraId>,
}
impl FrameEventToken {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub fn camera(&self) -> Option<CameraId> {
        self.camera
    }
}

/// 在渲染上下文中执行的命令
#[derive(Debug)]
pub enum RenderCommand {
    /// 创建管线，重复调用无副作用
    Prepare,
    /// 重建管线
    ResetPipeline,
    /// 基于当前场景构建 TLAS
    BuildTopLevel,
    /// 替换指定相机的渲染目标，其他相机不受影响
    SetRenderTarget(CameraId, RenderTargetDesc),
    RegisterDebugCallback(Option<RawDebugCallback>),
    /// 帧边界，同步参数并追踪光线
    FrameEvent(FrameEventToken),
    /// 执行到这里时发送一个信号，用于等待之前的命令全部完成
    Fence(Sender<()>),
    /// 退出渲染线程
    Shutdown,
}

/// 队列中的一条命令
#[derive(Debug)]
pub struct PendingCommand {
    /// 提交顺序，从 1 开始
    pub seq: u64,
    /// 提交时所在的帧，即之前已经提交的帧事件数量
    pub frame: u64,
    pub command: RenderCommand,
}

#[derive(Default)]
struct SenderState {
    next_seq: u64,
    frame_id: u64,
}

/// 创建命令通道，`capacity` 为 0 时不限制长度
///
/// 通道包含一个 FIFO 队列以及每帧覆盖写入的参数寄存器。
pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (sender, receiver) = if capacity == 0 {
        crossbeam_channel::unbounded::<PendingCommand>()
    } else {
        crossbeam_channel::bounded::<PendingCommand>(capacity)
    };
    let params = Arc::new(FrameParams::default());

    (
        CommandSender {
            sender,
            state: Arc::new(Mutex::new(SenderState::default())),
            params: params.clone(),
        },
        CommandReceiver { receiver, params },
    )
}

/// 宿主一侧
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<PendingCommand>,
    /// 序号分配与入队在同一把锁内，保证序号与队列顺序一致
    state: Arc<Mutex<SenderState>>,
    params: Arc<FrameParams>,
}
impl CommandSender {
    #[inline]
    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    /// 入队，返回序号
    pub fn enqueue(&self, command: RenderCommand) -> BridgeResult<u64> {
        let mut state = self.state.lock();
        let seq = state.next_seq + 1;
        let pending = PendingCommand {
            seq,
            frame: state.frame_id,
            command,
        };
        self.sender.send(pending).map_err(|_| BridgeError::ChannelClosed)?;
        state.next_seq = seq;
        Ok(seq)
    }

    /// 队列已满时不阻塞，直接失败
    pub fn try_enqueue(&self, command: RenderCommand) -> BridgeResult<u64> {
        let mut state = self.state.lock();
        let seq = state.next_seq + 1;
        let pending = PendingCommand {
            seq,
            frame: state.frame_id,
            command,
        };
        match self.sender.try_send(pending) {
            Ok(()) => {
                state.next_seq = seq;
                Ok(seq)
            }
            Err(TrySendError::Full(_)) => Err(BridgeError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(BridgeError::ChannelClosed),
        }
    }

    /// 结束当前帧：入队一个帧事件并返回对应的 token
    ///
    /// 在它之前提交的命令一定先于这一帧执行，之后提交的命令属于下一帧。
    #[inline]
    pub fn frame_event_token(&self) -> BridgeResult<FrameEventToken> {
        self.enqueue_frame_event(None)
    }

    /// 同 [`Self::frame_event_token`]，但只追踪一个相机
    #[inline]
    pub fn camera_event_token(&self, camera: CameraId) -> BridgeResult<FrameEventToken> {
        self.enqueue_frame_event(Some(camera))
    }

    fn enqueue_frame_event(&self, camera: Option<CameraId>) -> BridgeResult<FrameEventToken> {
        let mut state = self.state.lock();
        let token = FrameEventToken {
            frame_id: state.frame_id + 1,
            camera,
        };
        let seq = state.next_seq + 1;
        let pending = PendingCommand {
            seq,
            frame: state.frame_id,
            command: RenderCommand::FrameEvent(token),
        };
        self.sender.send(pending).map_err(|_| BridgeError::ChannelClosed)?;
        state.next_seq = seq;
        state.frame_id = token.frame_id;
        Ok(token)
    }

    /// 当前帧序号，即已经获取的 token 数量
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.state.lock().frame_id
    }
}

/// 渲染上下文一侧
pub struct CommandReceiver {
    receiver: Receiver<PendingCommand>,
    params: Arc<FrameParams>,
}
impl CommandReceiver {
    #[inline]
    pub fn params(&self) -> &FrameParams {
        &self.params
    }

    #[inline]
    pub fn try_recv(&self) -> Option<PendingCommand> {
        self.receiver.try_recv().ok()
    }

    /// 阻塞等待下一条命令，所有 sender 都被 drop 后返回 [`BridgeError::ChannelClosed`]
    #[inline]
    pub fn recv(&self) -> BridgeResult<PendingCommand> {
        self.receiver.recv().map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> BridgeResult<PendingCommand> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => BridgeError::Timeout(timeout),
            RecvTimeoutError::Disconnected => BridgeError::ChannelClosed,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
