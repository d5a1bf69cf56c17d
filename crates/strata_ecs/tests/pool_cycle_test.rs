//! Integration tests for full frame cycles: ids from an allocator, requests
//! from many threads, maintenance on one.

use strata_ecs::{
    ComponentPool, DataPool, Destructor, EcsError, EntityList, Id, IdAllocator, IdGroup,
    PoolConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_allocator_feeds_pool_across_frames() {
    let allocator = IdAllocator::new(IdGroup::from_value(2).unwrap());
    let mut pool = DataPool::<(u32, f32)>::new();

    // Frame 1: spawn 100
    let spawned: Vec<Id> = (0..100).map(|_| allocator.generate_id().unwrap()).collect();
    for (i, &id) in spawned.iter().enumerate() {
        pool.insert(id, (i as u32, i as f32 * 0.5));
    }
    pool.maintenance().unwrap();
    assert_eq!(pool.size(), 100);
    assert_eq!(pool.inserted(), 100);

    // Frame 2: despawn every third, free their ids
    let despawned: Vec<Id> = spawned.iter().copied().step_by(3).collect();
    for &id in &despawned {
        pool.remove(id);
    }
    pool.maintenance().unwrap();
    allocator.free_ids(pool.removed_ids()).unwrap();
    assert_eq!(pool.removed_ids(), despawned.as_slice());
    assert_eq!(allocator.recyclable(), despawned.len());

    // Frame 3: respawn into the recycled ids, oldest freed first
    let respawned: Vec<Id> = (0..despawned.len())
        .map(|_| allocator.generate_id().unwrap())
        .collect();
    assert_eq!(respawned, despawned);
    for &id in &respawned {
        pool.insert(id, (u32::MAX, -1.0));
    }
    pool.maintenance().unwrap();

    assert_eq!(pool.size(), 100);
    assert_eq!(pool.removed(), 0);
    assert!(pool.ids().windows(2).all(|w| w[0] < w[1]));
    for (id, (tag, _)) in pool.inserted_iter() {
        assert!(respawned.contains(&id));
        assert_eq!(*tag, u32::MAX);
    }

    let live: Vec<Id> = allocator.live_ids().collect();
    assert_eq!(live.as_slice(), pool.ids());
}

#[test]
fn test_many_producers_one_maintainer() {
    let num_threads = 8u32;
    let per_thread = 500u32;
    let mut pool = DataPool::<(u32,)>::new();
    let sender = pool.sender();

    thread::scope(|scope| {
        for t in 0..num_threads {
            let sender = sender.clone();
            scope.spawn(move || {
                for i in 0..per_thread {
                    let raw = t * per_thread + i + 1;
                    assert!(sender.insert(Id::from_raw(raw), (raw,)));
                }
            });
        }
    });

    pool.maintenance().unwrap();
    let total = (num_threads * per_thread) as usize;
    assert_eq!(pool.size(), total);
    assert_eq!(pool.capacity(), total.div_ceil(128) * 128);
    for (id, (value,)) in pool.iter() {
        assert_eq!(id.raw(), *value);
    }

    // Concurrent removal of every even id
    thread::scope(|scope| {
        for t in 0..num_threads {
            let sender = sender.clone();
            scope.spawn(move || {
                for i in (0..per_thread).filter(|i| i % 2 == 1) {
                    assert!(sender.remove(Id::from_raw(t * per_thread + i + 1)));
                }
            });
        }
    });

    pool.maintenance().unwrap();
    assert_eq!(pool.size(), total / 2);
    assert_eq!(pool.removed(), total / 2);
    assert!(pool.ids().iter().all(|id| id.raw() % 2 == 1));
    assert!(pool.removed_ids().iter().all(|id| id.raw() % 2 == 0));
}

#[test]
fn test_component_pool_shared_between_threads() {
    let mut pool = ComponentPool::new(std::mem::size_of::<u64>(), None).unwrap();

    thread::scope(|scope| {
        for t in 0..4u32 {
            let pool = &pool;
            scope.spawn(move || {
                for i in 0..250u32 {
                    let raw = i * 4 + t + 1;
                    pool.insert_pod(Id::from_raw(raw), &u64::from(raw * 2)).unwrap();
                }
            });
        }
    });

    assert!(pool.insert_capacity() >= 1000);
    pool.maintenance().unwrap();
    assert_eq!(pool.size(), 1000);
    assert_eq!(pool.insert_capacity(), 0);
    for (offset, id) in pool.ids().iter().enumerate() {
        assert_eq!(id.raw() as usize, offset + 1);
        assert_eq!(pool.get_pod::<u64>(offset), Some(u64::from(id.raw() * 2)));
    }
}

#[test]
fn test_component_pool_destructor_accounting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let destructor: Destructor = Arc::new(move |_element: &mut [u8]| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut pool = ComponentPool::new(4, Some(destructor)).unwrap();

    for raw in 1..=10u32 {
        pool.insert_pod(Id::from_raw(raw), &raw).unwrap();
    }
    // Two superseded duplicates
    pool.insert_pod(Id::from_raw(3), &33u32).unwrap();
    pool.insert_pod(Id::from_raw(3), &333u32).unwrap();
    pool.maintenance().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(pool.get_pod::<u32>(pool.find(Id::from_raw(3)).unwrap()), Some(333));

    for raw in 1..=5u32 {
        pool.remove(Id::from_raw(raw));
    }
    pool.maintenance().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    pool.maintenance().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 7);

    // Five stored plus one queued
    pool.insert_pod(Id::from_raw(99), &99u32).unwrap();
    drop(pool);
    assert_eq!(calls.load(Ordering::SeqCst), 13);
}

#[test]
fn test_configured_pools() {
    let config = PoolConfig::from_toml_str(
        r#"
        initial_capacity = 64
        expansion_rate = 32
        insert_capacity = 48
        "#,
    )
    .unwrap();

    let mut typed = DataPool::<(u8,)>::with_config(&config).unwrap();
    for raw in 1..=65 {
        typed.insert(Id::from_raw(raw), (raw as u8,));
    }
    typed.maintenance().unwrap();
    assert_eq!(typed.capacity(), 96);
    assert_eq!(typed.expansion_rate(), 32);

    let erased = ComponentPool::with_config(&config, 1, None).unwrap();
    assert_eq!(erased.insert_capacity(), 0);
    erased.insert(Id::from_raw(1), &[1]).unwrap();
    assert_eq!(erased.insert_capacity(), 48);

    assert!(matches!(
        PoolConfig::from_toml_str("expansion_rate = 0"),
        Err(EcsError::InvalidConfig(_))
    ));
}

#[test]
fn test_entity_list_publishes_pool_view() {
    let mut pool = DataPool::<(i32,)>::new();
    let visible = EntityList::new();
    pool.add_entity_list(visible.clone());

    for raw in 1..=10 {
        pool.insert(Id::from_raw(raw), (raw as i32 - 5,));
    }
    pool.maintenance().unwrap();

    // A system publishes the ids with positive values.
    let positive: Vec<Id> = pool
        .iter()
        .filter(|(_, (value,))| **value > 0)
        .map(|(id, _)| id)
        .collect();
    pool.entity_lists()[0].reset(&[&positive]);

    assert_eq!(visible.len(), 5);
    assert_eq!(visible.to_vec().first(), Some(&Id::from_raw(6)));
    assert!(pool.remove_entity_list(&visible));
}

#[test]
fn test_allocator_snapshot_restore() {
    let source = IdAllocator::new(IdGroup::PERSISTENT);
    let ids: Vec<Id> = (0..20).map(|_| source.generate_id().unwrap()).collect();
    source.free_ids(&[ids[4], ids[2], ids[17]]).unwrap();

    let snapshot = source.export_indexes();
    let restored = IdAllocator::new(IdGroup::PERSISTENT);
    restored
        .import_indexes(snapshot.next_index, &snapshot.recycled)
        .unwrap();

    assert_eq!(restored.export_indexes(), snapshot);
    assert_eq!(
        restored.live_ids().collect::<Vec<_>>(),
        source.live_ids().collect::<Vec<_>>()
    );
    assert_eq!(restored.generate_id().unwrap(), ids[4]);
    assert_eq!(restored.generate_id().unwrap(), ids[2]);
}
