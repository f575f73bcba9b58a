use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::SinkError;
use crate::network::Link;
use crate::protocol::rules::{FlowMatch, FlowRule, RuleCommand};
use crate::{PortNo, SwitchId, TableId};

/// Switch-programming transport. Installs replace any rule with the same match.
#[async_trait]
pub trait RuleSink: Send + Sync {
    async fn install_rule(&self, switch: SwitchId, rule: &FlowRule) -> Result<(), SinkError>;

    async fn remove_rules(
        &self,
        switch: SwitchId,
        table: TableId,
        flow_match: &FlowMatch,
    ) -> Result<(), SinkError>;
}

pub trait SwitchRegistry: Send + Sync {
    fn list_connected_switches(&self) -> BTreeMap<SwitchId, BTreeSet<PortNo>>;
}

pub trait LinkFeed: Send + Sync {
    fn current_links(&self) -> Vec<Link>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub command: RuleCommand,
    pub error: SinkError,
}

#[derive(Debug, Default)]
pub struct PushReport {
    pub applied: usize,
    pub failures: Vec<RuleFailure>,
}

impl PushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub async fn apply_command(sink: &dyn RuleSink, command: &RuleCommand) -> Result<(), SinkError> {
    match command {
        RuleCommand::Install { switch, rule } => sink.install_rule(*switch, rule).await,
        RuleCommand::Remove { switch, table, flow_match } => {
            sink.remove_rules(*switch, *table, flow_match).await
        }
    }
}

/// Applies `batch` in order. A failing command is recorded and the rest still go out.
pub async fn push_batch(sink: &dyn RuleSink, batch: &[RuleCommand]) -> PushReport {
    let mut report = PushReport::default();

    for command in batch {
        match apply_command(sink, command).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!("Rule command failed ({}): {}", command, e);
                report.failures.push(RuleFailure {
                    command: command.clone(),
                    error: e,
                });
            }
        }
    }

    report
}

/// Drains command batches until every sender is gone. Batches are applied in
/// arrival order so a purge always reaches the sink before the reinstall.
pub async fn run_pusher(sink: Arc<dyn RuleSink>, mut batches: mpsc::UnboundedReceiver<Vec<RuleCommand>>) {
    while let Some(batch) = batches.recv().await {
        let report = push_batch(sink.as_ref(), &batch).await;
        if report.is_clean() {
            debug!("Pushed {} rule command(s)", report.applied);
        } else {
            warn!(
                "Pushed {} rule command(s), {} failed",
                report.applied,
                report.failures.len()
            );
        }
    }
    debug!("Rule pusher stopped");
}

/// Sink that only logs what it would send.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl RuleSink for LoggingSink {
    async fn install_rule(&self, switch: SwitchId, rule: &FlowRule) -> Result<(), SinkError> {
        info!(
            "{}",
            RuleCommand::Install {
                switch,
                rule: rule.clone()
            }
        );
        Ok(())
    }

    async fn remove_rules(
        &self,
        switch: SwitchId,
        table: TableId,
        flow_match: &FlowMatch,
    ) -> Result<(), SinkError> {
        info!(
            "{}",
            RuleCommand::Remove {
                switch,
                table,
                flow_match: *flow_match
            }
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::RecordingSink;
    use super::*;
    use crate::protocol::rules::Action;
    use std::net::Ipv4Addr;

    fn install(switch: SwitchId, port: PortNo) -> RuleCommand {
        RuleCommand::Install {
            switch,
            rule: FlowRule {
                table: 1,
                priority: 1,
                flow_match: FlowMatch::ipv4_destination(Ipv4Addr::new(10, 0, 0, 1)),
                actions: vec![Action::Output(port)],
                idle_timeout: None,
            },
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_the_batch() {
        let sink = RecordingSink::new();
        sink.fail_switch(2);

        let batch = vec![install(1, 1), install(2, 2), install(3, 3)];
        let report = push_batch(&sink, &batch).await;

        assert_eq!(report.applied, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].command, batch[1]);
        assert_eq!(report.failures[0].error, SinkError::SwitchUnreachable(2));
        assert_eq!(sink.rule_count(), 2);
    }

    #[tokio::test]
    async fn test_install_twice_replaces() {
        let sink = RecordingSink::new();
        push_batch(&sink, &[install(1, 1), install(1, 1)]).await;
        assert_eq!(sink.rule_count(), 1);
    }

    #[tokio::test]
    async fn test_pusher_preserves_batch_order() {
        let sink = Arc::new(RecordingSink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_pusher(sink.clone(), rx));

        let remove = RuleCommand::Remove {
            switch: 1,
            table: 1,
            flow_match: FlowMatch::ipv4_destination(Ipv4Addr::new(10, 0, 0, 1)),
        };
        tx.send(vec![remove.clone()]).unwrap();
        tx.send(vec![install(1, 4)]).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(sink.commands(), vec![remove, install(1, 4)]);
        assert_eq!(
            sink.rule(1, Ipv4Addr::new(10, 0, 0, 1)).unwrap().output_port(),
            Some(4)
        );
    }
}
