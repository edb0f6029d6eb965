use std::sync::{Arc, Barrier};
use std::thread;

use archetype_query::prelude::*;
use archetype_query::QueryCache;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health(u32);

fn ids(raw: impl IntoIterator<Item = u32>) -> Vec<ComponentId> {
    raw.into_iter().map(ComponentId::from_raw).collect()
}

#[test]
fn test_permutations_share_one_descriptor() -> Result<()> {
    let cache = QueryCache::new(1);

    for arity in 1..=16u32 {
        let forward = ids(1..=arity);
        let reversed: Vec<_> = forward.iter().rev().copied().collect();
        let mut rotated = forward.clone();
        rotated.rotate_left(arity as usize / 2);

        let first = cache.get_or_create(&forward)?;
        assert!(Arc::ptr_eq(&first, &cache.get_or_create(&reversed)?));
        assert!(Arc::ptr_eq(&first, &cache.get_or_create(&rotated)?));
        assert_eq!(first.include(), forward.as_slice());
        assert_eq!(cache.len_for_arity(arity as usize), 1);
    }

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 16);
    assert_eq!(stats.inserted, 16);
    assert_eq!(stats.misses, 16);
    assert_eq!(stats.hits, 32);
    Ok(())
}

#[test]
fn test_pairs_ignore_order() -> Result<()> {
    let cache = QueryCache::new(1);
    let ab = cache.get_or_create(&ids([7, 3]))?;
    let ba = cache.get_or_create(&ids([3, 7]))?;
    assert!(Arc::ptr_eq(&ab, &ba));

    let other = cache.get_or_create(&ids([3, 8]))?;
    assert!(!Arc::ptr_eq(&ab, &other));
    assert_eq!(cache.len_for_arity(2), 2);
    Ok(())
}

#[test]
fn test_distinct_sets_get_distinct_descriptors() -> Result<()> {
    let cache = QueryCache::new(1);
    let a = cache.get_or_create(&ids([1, 2, 3]))?;
    let b = cache.get_or_create(&ids([1, 2, 4]))?;
    let c = cache.get_or_create(&ids([1, 2]))?;

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!a.same_filter(&b));
    assert_eq!(c.include(), ids([1, 2]).as_slice());
    assert_eq!(cache.len(), 3);
    Ok(())
}

#[test]
fn test_unsupported_arity() {
    let cache = QueryCache::new(1);
    assert_eq!(
        cache.get_or_create(&[]).unwrap_err(),
        EcsError::UnsupportedArity {
            requested: 0,
            max: 16
        }
    );
    assert_eq!(
        cache.get_or_create(&ids(1..=17)).unwrap_err(),
        EcsError::UnsupportedArity {
            requested: 17,
            max: 16
        }
    );
    assert!(cache.is_empty());
}

#[test]
fn test_duplicate_ids_rejected() {
    let cache = QueryCache::new(1);
    assert_eq!(
        cache.get_or_create(&ids([4, 9, 4])).unwrap_err(),
        EcsError::DuplicateComponent(ComponentId::from_raw(4))
    );
    assert!(cache.is_empty());
}

#[test]
fn test_concurrent_first_use_yields_one_descriptor() -> Result<()> {
    const THREADS: usize = 8;

    // Arity 1 and 2 use direct keys, larger arities go through the bucket hash
    for arity in [1usize, 2, 5] {
        let cache = Arc::new(QueryCache::new(1));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut set = ids(10..10 + arity as u32);
                    set.rotate_left(i % arity);
                    barrier.wait();
                    cache.get_or_create(&set)
                })
            })
            .collect();

        let descriptors = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread panicked"))
            .collect::<Result<Vec<_>>>()?;

        for descriptor in &descriptors[1..] {
            assert!(Arc::ptr_eq(&descriptors[0], descriptor), "arity {arity}");
        }
        assert_eq!(descriptors[0].include().len(), arity);

        let stats = cache.stats();
        assert_eq!(stats.entries_by_arity[arity - 1], 1, "arity {arity}");
        assert_eq!(stats.inserted, 1, "arity {arity}");
        assert_eq!(stats.hits + stats.misses, THREADS as u64);
        assert_eq!(stats.misses, stats.inserted + stats.discarded);
    }
    Ok(())
}

#[test]
fn test_forced_collisions_stay_distinct() -> Result<()> {
    let cache = QueryCache::with_bucket_hasher(1, |_| 0xDEAD_BEEF);

    let sets = [ids([1, 2, 3]), ids([4, 5, 6]), ids([1, 2, 4]), ids([7, 8, 9, 10])];
    let first: Vec<_> = sets
        .iter()
        .map(|set| cache.get_or_create(set))
        .collect::<Result<_>>()?;

    for (i, a) in first.iter().enumerate() {
        for b in &first[i + 1..] {
            assert!(!Arc::ptr_eq(a, b));
        }
    }

    for (set, descriptor) in sets.iter().zip(&first) {
        let mut shuffled = set.clone();
        shuffled.reverse();
        assert!(Arc::ptr_eq(descriptor, &cache.get_or_create(&shuffled)?));
    }

    let stats = cache.stats();
    assert_eq!(stats.entries_by_arity[2], 3);
    assert_eq!(stats.largest_bucket, 3);
    Ok(())
}

#[test]
fn test_world_cached_query_by_type() -> Result<()> {
    let mut world = World::new();
    world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 1.0 }))?;

    let a = world.cached_query::<(Position, Velocity)>()?;
    let b = world.cached_query::<(Velocity, Position)>()?;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.world_id(), world.id());

    let stats = world.query_cache_stats();
    assert_eq!(stats.entries_by_arity[1], 1);
    assert_eq!(stats.hits, 1);
    Ok(())
}

#[test]
fn test_world_with_colliding_hasher_still_executes() -> Result<()> {
    let mut world = World::with_bucket_hasher(WorldConfig::default(), |_| 7)?;
    world.spawn_batch((0..4).map(|i| (Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }, Health(1))))?;
    world.spawn_batch((0..3).map(|i| (Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }, Health(2), Phantom)))?;

    let mut plain = 0;
    let visited = world.execute_sequential::<(Position, Velocity, Health), _>(
        &mut |_: EntityId, _: &mut Position, _: &mut Velocity, _: &mut Health| plain += 1,
        None,
    )?;
    assert_eq!((visited, plain), (4, 4));

    let mut phantom = 0;
    let visited = world.execute_sequential::<(Velocity, Health, Phantom), _>(
        &mut |_: EntityId, _: &mut Velocity, _: &mut Health, _: &mut Phantom| phantom += 1,
        None,
    )?;
    assert_eq!((visited, phantom), (3, 3));

    let stats = world.query_cache_stats();
    assert_eq!(stats.entries_by_arity[2], 2);
    assert_eq!(stats.largest_bucket, 2);
    Ok(())
}
