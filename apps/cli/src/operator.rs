//! 操作员闸门
//!
//! 每张拍摄前提示 "Ready for '<category>'?"；Ctrl-C 置位的停止标志在下一个闸门处中止。

use inquire::{Confirm, InquireError};
use mda_client::{GateDecision, PlannedShot, ShotGate};
use mda_tools::ZoomGroup;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 操作员闸门
pub struct OperatorGate {
    /// `false` 时不提示，直接放行（`--yes`）
    interactive: bool,
    stop: Arc<AtomicBool>,
}

impl OperatorGate {
    pub fn new(interactive: bool, stop: Arc<AtomicBool>) -> Self {
        Self { interactive, stop }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl ShotGate for OperatorGate {
    fn on_group_start(&mut self, group: ZoomGroup, shots: usize) {
        println!();
        println!("📷 {} ({} shot(s))", group.name(), shots);
    }

    fn before_shot(&mut self, shot: &PlannedShot, position: usize, total: usize) -> GateDecision {
        if self.stopped() {
            return GateDecision::Abort;
        }
        let category = &shot.request.category;
        if !self.interactive {
            println!("[{}/{}] {}", position + 1, total, category);
            return GateDecision::Proceed;
        }

        let answer = Confirm::new(&format!("[{}/{}] Ready for '{}'?", position + 1, total, category))
            .with_default(true)
            .with_help_message("No 或 Esc 中止剩余拍摄（相机会被安全关闭）")
            .prompt();
        match answer {
            Ok(true) if !self.stopped() => GateDecision::Proceed,
            Ok(_) => GateDecision::Abort,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                self.stop.store(true, Ordering::SeqCst);
                GateDecision::Abort
            },
            Err(e) => {
                eprintln!("❌ 用户交互失败: {}", e);
                GateDecision::Abort
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mda_client::ShotRequest;

    fn shot() -> PlannedShot {
        PlannedShot {
            group: ZoomGroup::Z140,
            index_in_group: 0,
            request: ShotRequest::new("septum", "1/60", "f/8", "100"),
            order: Some(0),
        }
    }

    #[test]
    fn test_non_interactive_proceeds() {
        let mut gate = OperatorGate::new(false, Arc::new(AtomicBool::new(false)));
        assert_eq!(gate.before_shot(&shot(), 0, 3), GateDecision::Proceed);
    }

    #[test]
    fn test_stop_flag_aborts() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut gate = OperatorGate::new(false, stop.clone());
        stop.store(true, Ordering::SeqCst);
        assert_eq!(gate.before_shot(&shot(), 1, 3), GateDecision::Abort);
    }
}
