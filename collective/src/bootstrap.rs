use std::future::Future;

use log::{info, warn};
use tokio::task::JoinSet;

use crate::{
    config::GroupConfig,
    error::GroupErr,
    group::{Collective, LocalGroup},
};

/// Brings up a full process group and runs `work` once per rank.
///
/// Each rank is spawned as its own task, joins the group within the
/// configured timeout, and then runs `work` with its joined handle. If any
/// rank fails to join or returns an error, the whole group is torn down and
/// the first error is returned; there is no degraded mode with a missing
/// rank, since gradient averaging needs all of them.
///
/// # Returns
/// The per-rank outputs in rank order.
pub async fn bootstrap<F, Fut, T, E>(cfg: &GroupConfig, work: F) -> std::result::Result<Vec<T>, E>
where
    F: Fn(LocalGroup) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<GroupErr> + Send + 'static,
{
    cfg.validate()?;

    let world = cfg.world_size.get();
    info!(
        "establishing {} group of {world} at {}",
        cfg.backend.name(),
        cfg.rendezvous
    );

    let timeout = cfg.join_timeout;
    let mut set: JoinSet<(usize, std::result::Result<T, E>)> = JoinSet::new();

    for group in LocalGroup::create(cfg.world_size) {
        let work = work.clone();
        let rank = group.rank();

        set.spawn(async move {
            let out = match group.join(timeout).await {
                Ok(()) => work(group).await,
                Err(e) => Err(E::from(e)),
            };
            (rank, out)
        });
    }

    let mut outputs: Vec<Option<T>> = (0..world).map(|_| None).collect();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((rank, Ok(out))) => outputs[rank] = Some(out),
            Ok((rank, Err(e))) => {
                warn!("rank {rank} failed, aborting the whole group");
                set.abort_all();
                return Err(e);
            }
            Err(join_err) => {
                set.abort_all();
                return Err(E::from(GroupErr::WorkerPanicked {
                    detail: join_err.to_string(),
                }));
            }
        }
    }

    if outputs.iter().any(Option::is_none) {
        return Err(E::from(GroupErr::WorkerPanicked {
            detail: "a rank exited without reporting".to_string(),
        }));
    }

    Ok(outputs.into_iter().flatten().collect())
}
