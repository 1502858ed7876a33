use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use abi::config::HealerConfig;
use abi::errors::{Error, Result};
use abi::model::{
    ChangeEvent, ChangeKind, DocPath, FriendshipEdge, RemovedFriend, FRIENDS,
};
use db::DocumentStore;

/// What healing one edge `owner -> friend` ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealAction {
    /// the mirror edge was missing and has been written
    Created,
    AlreadyPresent,
    /// the edge was deleted before it could be healed
    SourceGone,
    /// the edge outlived a removal by the friend and is left as it is
    RemovalLeftover,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub healed: usize,
    pub leftovers: usize,
    pub failed: usize,
}

/// Restores reciprocity of friendship edges.
///
/// Created edges are healed as they appear on the change feed. A periodic
/// sweep over every `friends` collection catches what the feed missed.
#[derive(Debug, Clone)]
pub struct HealerService {
    store: Arc<dyn DocumentStore>,
    sweep_interval: Option<Duration>,
}

impl HealerService {
    pub fn new(store: Arc<dyn DocumentStore>, config: &HealerConfig) -> Self {
        let sweep_interval = match config.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            store,
            sweep_interval,
        }
    }

    /// Make sure `friend -> owner` exists while `owner -> friend` does.
    ///
    /// Never writes when the mirror is present, so healing the mirror's own
    /// creation event is a no-op. An edge the friend already removed from
    /// their side is not completed again, and it is not deleted either.
    pub async fn heal_edge(&self, owner: &str, friend: &str) -> Result<HealAction> {
        let source_path = DocPath::friend_edge(owner, friend)?;
        let mirror_path = DocPath::friend_edge(friend, owner)?;

        let Some(source) = self.store.get(&source_path).await? else {
            return Ok(HealAction::SourceGone);
        };
        if self.store.exists(&mirror_path).await? {
            return Ok(HealAction::AlreadyPresent);
        }

        let source = FriendshipEdge::try_from(&source)?;
        let marker_path = DocPath::removed_friend(friend, owner)?;
        if let Some(marker) = self.store.get(&marker_path).await? {
            let marker = RemovedFriend::try_from(&marker)?;
            if source.added_at <= marker.removed_at {
                debug!("{} left over by a removal, not healed", source_path);
                return Ok(HealAction::RemovalLeftover);
            }
        }

        self.store
            .set(&mirror_path, FriendshipEdge::fields(owner))
            .await?;
        info!("healed friendship {} <- {}", owner, friend);
        Ok(HealAction::Created)
    }

    /// Only creations of friendship edges are acted on.
    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<Option<HealAction>> {
        if event.kind != ChangeKind::Created {
            return Ok(None);
        }
        let Some((owner, friend)) = event.path.as_friend_edge() else {
            return Ok(None);
        };
        let action = self.heal_edge(owner, friend).await?;
        debug!("{} handled: {:?}", event.path, action);
        Ok(Some(action))
    }

    /// Heal every friendship edge in the store.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let docs = self.store.list_group(FRIENDS).await?;
        let mut report = SweepReport::default();
        for doc in &docs {
            let Some((owner, friend)) = doc.path.as_friend_edge() else {
                continue;
            };
            report.scanned += 1;
            match self.heal_edge(owner, friend).await {
                Ok(HealAction::Created) => report.healed += 1,
                Ok(HealAction::RemovalLeftover) => report.leftovers += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("heal {} failed: {}", doc.path, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Consume the change feed until it closes.
    pub async fn run(&self) -> Result<()> {
        let mut rx = self.store.subscribe();
        let mut ticker = self.sweep_interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        info!("healer started, sweep interval: {:?}", self.sweep_interval);
        if ticker.is_none() {
            // without a periodic sweep, still heal what exists already
            self.sweep_logged().await;
        }

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(&event).await {
                            error!("heal after {} {} failed: {}", event.kind, event.path, e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("healer lagged, {} events skipped, sweeping", skipped);
                        self.sweep_logged().await;
                    }
                    Err(RecvError::Closed) => {
                        return Err(Error::broadcast("change feed closed"));
                    }
                },
                _ = tick(&mut ticker) => self.sweep_logged().await,
            }
        }
    }

    async fn sweep_logged(&self) {
        match self.sweep().await {
            Ok(report) if report.healed > 0 || report.failed > 0 => {
                info!("sweep finished: {:?}", report)
            }
            Ok(report) => debug!("sweep finished: {:?}", report),
            Err(e) => error!("sweep failed: {}", e),
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use db::{MemoryStore, StoreOp};

    use super::*;

    fn edge(owner: &str, friend: &str) -> DocPath {
        DocPath::friend_edge(owner, friend).unwrap()
    }

    fn healer(store: &Arc<MemoryStore>) -> HealerService {
        HealerService::new(store.clone(), &HealerConfig::default())
    }

    async fn add_edge(store: &MemoryStore, owner: &str, friend: &str) {
        store
            .set(&edge(owner, friend), FriendshipEdge::fields(friend))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn heal_should_create_missing_mirror() {
        let store = Arc::new(MemoryStore::new());
        add_edge(&store, "a", "b").await;
        let healer = healer(&store);

        assert_eq!(healer.heal_edge("a", "b").await.unwrap(), HealAction::Created);
        let mirror = store.get(&edge("b", "a")).await.unwrap().unwrap();
        let mirror = FriendshipEdge::try_from(&mirror).unwrap();
        assert_eq!(mirror.friend_id, "a");
    }

    #[tokio::test]
    async fn heal_should_be_idempotent() {
        let store = Arc::new(MemoryStore::new());
        add_edge(&store, "a", "b").await;
        let healer = healer(&store);
        healer.heal_edge("a", "b").await.unwrap();

        let mut rx = store.subscribe();
        let before = store.get(&edge("b", "a")).await.unwrap();
        assert_eq!(
            healer.heal_edge("a", "b").await.unwrap(),
            HealAction::AlreadyPresent
        );
        assert_eq!(healer.heal_edge("b", "a").await.unwrap(), HealAction::AlreadyPresent);
        // nothing rewritten, nothing published
        assert_eq!(store.get(&edge("b", "a")).await.unwrap(), before);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn healed_edge_event_should_not_retrigger() {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe();
        let healer = healer(&store);
        add_edge(&store, "a", "b").await;

        let created = rx.recv().await.unwrap();
        assert_eq!(
            healer.handle_event(&created).await.unwrap(),
            Some(HealAction::Created)
        );
        let mirror_created = rx.recv().await.unwrap();
        assert_eq!(mirror_created.path, edge("b", "a"));
        assert_eq!(
            healer.handle_event(&mirror_created).await.unwrap(),
            Some(HealAction::AlreadyPresent)
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_edge_creations_should_be_handled() {
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe();
        let healer = healer(&store);
        add_edge(&store, "a", "b").await;
        add_edge(&store, "a", "b").await;
        store.delete(&edge("a", "b")).await.unwrap();
        store
            .set(
                &DocPath::friend_request("a", "c").unwrap(),
                abi::model::FriendRequest::fields("c"),
            )
            .await
            .unwrap();

        let _created = rx.recv().await.unwrap();
        for _ in 0..3 {
            let event = rx.recv().await.unwrap();
            assert_eq!(healer.handle_event(&event).await.unwrap(), None);
        }
        assert!(store.get(&edge("b", "a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_source_should_not_be_healed() {
        let store = Arc::new(MemoryStore::new());
        let healer = healer(&store);
        assert_eq!(
            healer.heal_edge("a", "b").await.unwrap(),
            HealAction::SourceGone
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn removal_leftover_should_be_left_alone() {
        let store = Arc::new(MemoryStore::new());
        add_edge(&store, "b", "a").await;
        // a removed b but b's edge could not be deleted
        let marker = DocPath::removed_friend("a", "b").unwrap();
        store.set(&marker, RemovedFriend::fields("b")).await.unwrap();
        let healer = healer(&store);

        assert_eq!(
            healer.heal_edge("b", "a").await.unwrap(),
            HealAction::RemovalLeftover
        );
        assert!(store.get(&edge("b", "a")).await.unwrap().is_some());
        assert!(store.get(&edge("a", "b")).await.unwrap().is_none());
        assert!(store.get(&marker).await.unwrap().is_some());

        let report = healer.sweep().await.unwrap();
        assert_eq!(report.leftovers, 1);
        assert_eq!(report.healed, 0);
        assert!(store.get(&edge("a", "b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_friendship_after_removal_should_heal() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &DocPath::removed_friend("a", "b").unwrap(),
                RemovedFriend::fields("b"),
            )
            .await
            .unwrap();
        add_edge(&store, "b", "a").await;
        let healer = healer(&store);

        assert_eq!(healer.heal_edge("b", "a").await.unwrap(), HealAction::Created);
        assert!(store.get(&edge("a", "b")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_should_heal_every_one_sided_pair() {
        let store = Arc::new(MemoryStore::new());
        add_edge(&store, "a", "b").await;
        add_edge(&store, "c", "d").await;
        add_edge(&store, "e", "f").await;
        add_edge(&store, "f", "e").await;
        let healer = healer(&store);

        let report = healer.sweep().await.unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.healed, 2);
        assert_eq!(report.failed, 0);
        assert!(store.get(&edge("b", "a")).await.unwrap().is_some());
        assert!(store.get(&edge("d", "c")).await.unwrap().is_some());

        let report = healer.sweep().await.unwrap();
        assert_eq!(report.scanned, 6);
        assert_eq!(report.healed, 0);
    }

    #[tokio::test]
    async fn sweep_should_count_failures_and_continue() {
        let store = Arc::new(MemoryStore::new());
        add_edge(&store, "a", "b").await;
        add_edge(&store, "c", "d").await;
        store.fail(StoreOp::Set, "users/b/");
        let healer = healer(&store);

        let report = healer.sweep().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.healed, 1);

        store.clear_fail_points();
        assert_eq!(healer.sweep().await.unwrap().healed, 1);
    }
}
