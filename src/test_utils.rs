//! Scripted stand-ins for the camera, the localizer and the vehicle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{Result, bail};
use opencv::core::{CV_8UC3, Mat, Scalar};
use opencv::prelude::*;

use crate::control::VelocityCommand;
use crate::flight::{Ack, VehicleTransport};
use crate::geometry::PoseEstimate;
use crate::io::{Frame, FrameRead, FrameSource};
use crate::localization::PoseEstimator;

/// `width` x `height` BGR image filled with `value`.
pub fn solid_image(width: i32, height: i32, value: u8) -> Mat {
    Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(value as f64))
        .unwrap()
}

/// Plays back a success/failure script, then keeps producing frames
/// (or reports `Closed` when built with [`ScriptedFrames::closing`]).
pub struct ScriptedFrames {
    script: VecDeque<bool>,
    close_after_script: bool,
    reads: u64,
    pub image: Mat,
}

impl ScriptedFrames {
    pub fn new(script: Vec<bool>) -> Self {
        Self {
            script: script.into(),
            close_after_script: false,
            reads: 0,
            image: solid_image(32, 24, 0),
        }
    }

    pub fn closing(mut self) -> Self {
        self.close_after_script = true;
        self
    }
}

impl FrameSource for ScriptedFrames {
    fn read(&mut self) -> FrameRead {
        self.reads += 1;
        let ok = match self.script.pop_front() {
            Some(ok) => ok,
            None if self.close_after_script => return FrameRead::Closed,
            None => true,
        };
        if ok {
            FrameRead::Ready(Frame::new(self.image.clone(), self.reads))
        } else {
            FrameRead::Unavailable
        }
    }

    fn describe(&self) -> String {
        "scripted frames".to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Estimate {
    Pose(PoseEstimate),
    Lost,
    Fail,
}

/// Returns scripted estimates, then `fallback` forever.
pub struct ScriptedEstimator {
    script: VecDeque<Estimate>,
    fallback: Estimate,
}

impl ScriptedEstimator {
    pub fn always(pose: PoseEstimate) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Estimate::Pose(pose),
        }
    }

    pub fn lost() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Estimate::Lost,
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = Estimate>) -> Self {
        self.script.extend(script);
        self
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn process(&mut self, _frame: &Frame) -> Result<Option<PoseEstimate>> {
        match self.script.pop_front().unwrap_or(self.fallback) {
            Estimate::Pose(pose) => Ok(Some(pose)),
            Estimate::Lost => Ok(None),
            Estimate::Fail => bail!("scripted estimator failure"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCall {
    Takeoff,
    EnableControl,
    Velocity(VelocityCommand),
    DisableControl,
}

/// Scripted reply to a vehicle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Reject,
    /// Transport-level failure (timeout, broken pipe).
    Error,
}

impl Reply {
    fn into_result(self) -> Result<Ack> {
        match self {
            Reply::Ok => Ok(Ack::Success),
            Reply::Reject => Ok(Ack::Rejected("failed".to_string())),
            Reply::Error => bail!("scripted transport error"),
        }
    }
}

/// Shared view of every request a [`ScriptedVehicle`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<VehicleCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<VehicleCall> {
        self.0.borrow().clone()
    }

    pub fn count(&self, call: &VehicleCall) -> usize {
        self.0.borrow().iter().filter(|c| *c == call).count()
    }

    /// Velocity commands only, in order.
    pub fn velocities(&self) -> Vec<VelocityCommand> {
        self.0
            .borrow()
            .iter()
            .filter_map(|c| match c {
                VehicleCall::Velocity(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: VehicleCall) {
        self.0.borrow_mut().push(call);
    }
}

/// Vehicle fake that records requests and answers from a script.
pub struct ScriptedVehicle {
    log: CallLog,
    takeoff_failures: u32,
    enable_failures: u32,
    velocity_replies: VecDeque<Reply>,
    velocity_default: Reply,
    disable_reply: Reply,
}

impl ScriptedVehicle {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            takeoff_failures: 0,
            enable_failures: 0,
            velocity_replies: VecDeque::new(),
            velocity_default: Reply::Ok,
            disable_reply: Reply::Ok,
        }
    }

    /// Reject the first `n` take-off requests.
    pub fn with_takeoff_failures(mut self, n: u32) -> Self {
        self.takeoff_failures = n;
        self
    }

    pub fn with_enable_failures(mut self, n: u32) -> Self {
        self.enable_failures = n;
        self
    }

    pub fn with_velocity_replies(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.velocity_replies.extend(replies);
        self
    }

    /// Reply used once the scripted velocity replies run out.
    pub fn with_velocity_default(mut self, reply: Reply) -> Self {
        self.velocity_default = reply;
        self
    }

    pub fn with_disable_reply(mut self, reply: Reply) -> Self {
        self.disable_reply = reply;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl VehicleTransport for ScriptedVehicle {
    fn takeoff(&mut self) -> Result<Ack> {
        self.log.push(VehicleCall::Takeoff);
        if self.takeoff_failures > 0 {
            self.takeoff_failures -= 1;
            return Reply::Reject.into_result();
        }
        Reply::Ok.into_result()
    }

    fn enable_control(&mut self) -> Result<Ack> {
        self.log.push(VehicleCall::EnableControl);
        if self.enable_failures > 0 {
            self.enable_failures -= 1;
            return Reply::Error.into_result();
        }
        Reply::Ok.into_result()
    }

    fn send_velocity(&mut self, ascent: f64, roll: f64, pitch: f64) -> Result<Ack> {
        self.log
            .push(VehicleCall::Velocity(VelocityCommand::new(ascent, roll, pitch)));
        self.velocity_replies
            .pop_front()
            .unwrap_or(self.velocity_default)
            .into_result()
    }

    fn disable_control(&mut self) -> Result<Ack> {
        self.log.push(VehicleCall::DisableControl);
        self.disable_reply.into_result()
    }
}
