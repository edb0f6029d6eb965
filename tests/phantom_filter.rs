use archetype_query::prelude::*;

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
struct Mass(f32);

fn populate(world: &mut World) -> Result<()> {
    world.spawn_batch((0..3).map(|i| {
        (
            Position {
                x: i as f32,
                y: 0.0,
            },
            Velocity { x: 1.0, y: 0.0 },
        )
    }))?;
    world.spawn_batch((0..4).map(|i| {
        (
            Position {
                x: i as f32,
                y: 0.0,
            },
            Velocity { x: 1.0, y: 0.0 },
            Mass(2.0),
        )
    }))?;
    world.spawn_batch((0..2).map(|i| {
        (
            Position {
                x: i as f32,
                y: 100.0,
            },
            Velocity { x: 1.0, y: 0.0 },
            Phantom,
        )
    }))?;
    Ok(())
}

#[test]
fn test_phantom_has_reserved_id() {
    assert_eq!(component_id::<Phantom>(), ComponentId::PHANTOM);
    assert_eq!(ComponentId::PHANTOM.raw(), 0);
}

#[test]
fn test_cached_query_skips_phantom_records() -> Result<()> {
    let mut world = World::new();
    populate(&mut world)?;

    let mut ys = Vec::new();
    let visited = world.execute_sequential::<(Position, Velocity), _>(
        &mut |_: EntityId, pos: &mut Position, _: &mut Velocity| ys.push(pos.y),
        None,
    )?;

    assert_eq!(visited, 7);
    assert!(ys.iter().all(|&y| y == 0.0));

    let descriptor = world.cached_query::<(Position, Velocity)>()?;
    assert_eq!(descriptor.exclude(), &[ComponentId::PHANTOM]);
    Ok(())
}

#[test]
fn test_requesting_phantom_disables_exclusion() -> Result<()> {
    let mut world = World::new();
    populate(&mut world)?;

    let mut ys = Vec::new();
    let visited = world.execute_sequential::<(Position, Phantom), _>(
        &mut |_: EntityId, pos: &mut Position, _: &mut Phantom| ys.push(pos.y),
        None,
    )?;

    assert_eq!(visited, 2);
    assert!(ys.iter().all(|&y| y == 100.0));

    let descriptor = world.cached_query::<(Phantom, Position)>()?;
    assert!(descriptor.exclude().is_empty());
    assert!(descriptor.include().contains(&ComponentId::PHANTOM));
    Ok(())
}

#[test]
fn test_explicit_descriptor_has_no_implicit_exclusion() -> Result<()> {
    let mut world = World::new();
    populate(&mut world)?;

    let everything = QueryDescriptor::builder()
        .with::<Position>()
        .with::<Velocity>()
        .build(&world);
    let mut calls = 0;
    let visited = world.execute_sequential::<(Position,), _>(
        &mut |_: EntityId, _: &mut Position| calls += 1,
        Some(&*everything),
    )?;
    assert_eq!((visited, calls), (9, 9));

    let live_only = QueryDescriptor::builder()
        .with::<Position>()
        .without::<Phantom>()
        .build(&world);
    assert_eq!(
        world.execute_sequential::<(Position,), _>(
            &mut |_: EntityId, _: &mut Position| {},
            Some(&*live_only),
        )?,
        7
    );
    Ok(())
}

#[test]
fn test_count_respects_phantom() -> Result<()> {
    let mut world = World::new();
    populate(&mut world)?;

    assert_eq!(world.count::<(Position,)>()?, 7);
    assert_eq!(world.count::<(Mass,)>()?, 4);
    assert_eq!(world.count::<(Phantom,)>()?, 2);
    assert_eq!(world.entity_count(), 9);
    Ok(())
}
