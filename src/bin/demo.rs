//! Block spawner demo: dynamically created blocks get auto-wired, finish,
//! and are removed, with the spawner's dynamic marker tracking them.

use std::any::Any;
use std::error::Error;

use autosignals::{
    names, Behavior, ConnectPolicy, HandlerDecl, HandlerMarker, SceneTree, SignalWiring,
};

#[derive(Default)]
struct BlockSpawner {
    total_spawned: u32,
    finished_seen: u32,
}

impl Behavior for BlockSpawner {
    fn handlers(&self) -> Vec<HandlerDecl> {
        vec![HandlerDecl::new::<BlockSpawner>(
            "on_block_finished",
            HandlerMarker::new(names::FINISHED)
                .expect("non-empty signal name")
                .dynamic(),
            |s| {
                s.finished_seen += 1;
                tracing::info!(finished = s.finished_seen, "block finished");
            },
        )]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Block;

impl Behavior for Block {
    fn signals(&self) -> &'static [&'static str] {
        &[names::FINISHED]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct StatusPanel {
    updates: u32,
}

impl Behavior for StatusPanel {
    fn handlers(&self) -> Vec<HandlerDecl> {
        // deferred: the update runs at the end of the cycle, after every
        // inline handler of the same emission
        vec![HandlerDecl::new::<StatusPanel>(
            "on_spawner_ready",
            HandlerMarker::new(names::READY)
                .expect("non-empty signal name")
                .source("../Spawner")
                .policy(ConnectPolicy::Deferred),
            |p| {
                p.updates += 1;
                tracing::info!(updates = p.updates, "status panel refreshed");
            },
        )]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct SpawnerShell;

impl Behavior for SpawnerShell {
    fn signals(&self) -> &'static [&'static str] {
        &[names::READY]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    autosignals::logging::init();

    let mut tree = SceneTree::new();
    let mut wiring = SignalWiring::new();

    // the spawner node emits `ready`; its behavior owns the dynamic rule
    let spawner = tree.add_node(tree.root(), "Spawner", Box::new(SpawnerShell))?;
    let panel = tree.add_node(tree.root(), "Status", Box::new(StatusPanel::default()))?;
    wiring.pump(&mut tree);

    // SpawnerShell has no markers of its own; wire the block-watching
    // behavior as a child that arms against the spawner's children
    let watcher = tree.add_node(spawner, "Watcher", Box::new(BlockSpawner::default()))?;
    wiring.pump(&mut tree);

    tree.emit(spawner, names::READY)?;

    for i in 0..3 {
        let name = format!("Block{}", i);
        let block = tree.add_node(watcher, name, Box::new(Block))?;
        wiring.pump(&mut tree);
        if let Some(w) = tree.behavior_as_mut::<BlockSpawner>(watcher) {
            w.total_spawned += 1;
        }

        tree.emit(block, names::FINISHED)?;
        tree.remove_node(block)?;
        wiring.pump(&mut tree);
    }

    // end of update cycle: deferred handlers run now
    tree.flush_deferred();

    let watcher_state = tree
        .behavior_as::<BlockSpawner>(watcher)
        .ok_or("watcher missing")?;
    tracing::info!(
        spawned = watcher_state.total_spawned,
        finished = watcher_state.finished_seen,
        tracked = wiring.tracked_count(),
        "demo finished"
    );
    let panel_state = tree.behavior_as::<StatusPanel>(panel).ok_or("panel missing")?;
    tracing::info!(panel_updates = panel_state.updates, "panel state");

    wiring.teardown(&mut tree);
    Ok(())
}
