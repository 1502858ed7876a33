use futures::stream::{BoxStream, StreamExt};
use tracing::{error, info, warn};

use abi::errors::{Error, Result};
use abi::model::{
    AcceptOutcome, CollectionPath, DocPath, Document, FriendWithUser, FriendshipEdge,
    FriendshipState, RemoveOutcome, RemovedFriend,
};

use crate::{ensure_distinct, FriendService};

impl FriendService {
    /// Turn the pending request of `requester` into a friendship.
    ///
    /// The accepter's edge is written first and any failure there aborts the
    /// whole operation. The requester's edge is best effort: when it fails the
    /// pair stays one-sided until the healer completes it, and the outcome
    /// reports `reverse_written = false`. The request is removed in both cases.
    pub async fn accept_request(&self, accepter: &str, requester: &str) -> Result<AcceptOutcome> {
        ensure_distinct(accepter, requester)?;
        let request_path = DocPath::friend_request(accepter, requester)?;
        let forward_path = DocPath::friend_edge(accepter, requester)?;
        let reverse_path = DocPath::friend_edge(requester, accepter)?;

        if !self.store.exists(&request_path).await? {
            return Err(Error::not_found_with_details(format!(
                "no friend request from {} to {}",
                requester, accepter
            )));
        }

        let forward = self
            .store
            .set(&forward_path, FriendshipEdge::fields(requester))
            .await?;

        let reverse_written = match self
            .store
            .set(&reverse_path, FriendshipEdge::fields(accepter))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "write {} failed, friendship stays one-sided until healed: {}",
                    reverse_path, e
                );
                false
            }
        };

        self.store.delete(&request_path).await?;

        // a request in the other direction is answered as well
        let crossing = DocPath::friend_request(requester, accepter)?;
        if let Err(e) = self.store.delete(&crossing).await {
            warn!("delete crossing request {} failed: {}", crossing, e);
        }
        self.clear_removal_markers(accepter, requester).await;

        info!(
            "{} accepted {} (reverse edge written: {})",
            accepter, requester, reverse_written
        );
        Ok(AcceptOutcome {
            edge: FriendshipEdge::try_from(&forward)?,
            reverse_written,
        })
    }

    /// Delete both edges of the friendship concurrently.
    ///
    /// Only the caller's own edge must go. If the counterpart edge survives, a
    /// `removedFriends` marker keeps the healer from restoring the pair. Once
    /// both edges are gone no marker of the pair is needed any more.
    pub async fn remove_friend(&self, user_id: &str, friend_id: &str) -> Result<RemoveOutcome> {
        ensure_distinct(user_id, friend_id)?;
        let local = DocPath::friend_edge(user_id, friend_id)?;
        let counterpart = DocPath::friend_edge(friend_id, user_id)?;

        let (local_result, counterpart_result) =
            tokio::join!(self.store.delete(&local), self.store.delete(&counterpart));

        if let Err(e) = local_result {
            error!("remove {} failed: {}", local, e);
            return Err(e);
        }

        let counterpart_removed = match counterpart_result {
            Ok(()) => {
                self.clear_removal_markers(user_id, friend_id).await;
                true
            }
            Err(e) => {
                warn!("remove {} failed, leaving a removal marker: {}", counterpart, e);
                self.mark_removed(user_id, friend_id).await;
                false
            }
        };

        info!("{} removed {}", user_id, friend_id);
        Ok(RemoveOutcome {
            friend_id: friend_id.to_string(),
            counterpart_removed,
        })
    }

    pub async fn list_friends(&self, user_id: &str) -> Result<Vec<FriendWithUser>> {
        let docs = self.store.list(&CollectionPath::friends(user_id)?).await?;
        self.enrich_friends(docs).await
    }

    /// Friends of `user_id`, re-emitted after every change.
    pub fn watch_friends(
        &self,
        user_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<FriendWithUser>>>> {
        let collection = CollectionPath::friends(user_id)?;
        let service = self.clone();
        Ok(db::watch_collection(self.store.clone(), collection)
            .then(move |snapshot| {
                let service = service.clone();
                async move { service.enrich_friends(snapshot?).await }
            })
            .boxed())
    }

    /// State of the unordered pair, read from all four documents.
    pub async fn friendship_state(&self, user_id: &str, other_id: &str) -> Result<FriendshipState> {
        ensure_distinct(user_id, other_id)?;
        let to_user = DocPath::friend_request(user_id, other_id)?;
        let to_other = DocPath::friend_request(other_id, user_id)?;
        let forward = DocPath::friend_edge(user_id, other_id)?;
        let reverse = DocPath::friend_edge(other_id, user_id)?;

        let (to_user, to_other, forward, reverse) = tokio::try_join!(
            self.store.exists(&to_user),
            self.store.exists(&to_other),
            self.store.exists(&forward),
            self.store.exists(&reverse),
        )?;
        Ok(FriendshipState::from_parts(
            to_user || to_other,
            forward,
            reverse,
        ))
    }

    async fn mark_removed(&self, user_id: &str, friend_id: &str) {
        let marker = match DocPath::removed_friend(user_id, friend_id) {
            Ok(path) => path,
            Err(e) => {
                error!("removal marker path for {}: {}", friend_id, e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(&marker, RemovedFriend::fields(friend_id))
            .await
        {
            error!("write removal marker {} failed: {}", marker, e);
        }
    }

    // best effort, a stale marker only holds back edges older than itself
    async fn clear_removal_markers(&self, user_id: &str, other_id: &str) {
        for (owner, friend) in [(user_id, other_id), (other_id, user_id)] {
            let marker = match DocPath::removed_friend(owner, friend) {
                Ok(path) => path,
                Err(e) => {
                    error!("removal marker path for {}: {}", friend, e);
                    continue;
                }
            };
            if let Err(e) = self.store.delete(&marker).await {
                warn!("delete removal marker {} failed: {}", marker, e);
            }
        }
    }

    // one profile read per edge
    async fn enrich_friends(&self, docs: Vec<Document>) -> Result<Vec<FriendWithUser>> {
        let mut friends = Vec::with_capacity(docs.len());
        for doc in &docs {
            let edge = match FriendshipEdge::try_from(doc) {
                Ok(edge) => edge,
                Err(e) => {
                    warn!("skip malformed edge {}: {}", doc.path, e);
                    continue;
                }
            };
            if let Some(user) = self.lookup_profile(&edge.friend_id).await? {
                friends.push(FriendWithUser {
                    user,
                    added_at: edge.added_at,
                });
            }
        }
        friends.sort_by(|a, b| {
            a.added_at
                .cmp(&b.added_at)
                .then_with(|| a.user.id.cmp(&b.user.id))
        });
        Ok(friends)
    }
}
