//! Built-in commands installed by the host at startup.
//!
//! These are ordinary [`NativeHandler`]s. They print their result and return
//! nothing, and report bad input as [`HandlerFault`]s.

use std::cell::RefCell;
use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::RegistryResult;
use crate::handler::{HandlerFault, HandlerResult, NativeHandler};
use crate::registry::{CommandEntry, CommandRegistry};
use crate::script::Value;

/// Most dice a single `roll` may throw.
pub const MAX_DICE: u32 = 100;
/// Most faces a die may have.
pub const MAX_FACES: u32 = 1000;

/// Register greet, add, subtract and roll.
///
/// Built-ins take precedence over stored custom commands of the same name,
/// so this runs after the registry has loaded its store.
pub fn register_builtins(registry: &mut CommandRegistry, seed: Option<u64>) -> RegistryResult<()> {
    registry.register(
        CommandEntry::builtin("greet", NativeHandler::new("greet", &["name"], greet))
            .with_description("Greets the user by name.")
            .with_aliases(["hello"]),
    )?;
    registry.register(
        CommandEntry::builtin("add", NativeHandler::new("add", &["a", "b"], add))
            .with_description("Adds two numbers."),
    )?;
    registry.register(
        CommandEntry::builtin(
            "subtract",
            NativeHandler::new("subtract", &["a", "b"], subtract),
        )
        .with_description("Subtracts the second number from the first."),
    )?;

    let rng = RefCell::new(match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    });
    registry.register(
        CommandEntry::builtin(
            "roll",
            NativeHandler::new("roll", &["dice"], move |args, out| {
                roll(&args[0], &mut *rng.borrow_mut(), out)
            }),
        )
        .with_description("Rolls dice in NdM notation, e.g. 2d6."),
    )?;
    Ok(())
}

fn emit(out: &mut dyn Write, line: std::fmt::Arguments<'_>) -> HandlerResult {
    writeln!(out, "{line}").map_err(|e| HandlerFault::new(format!("cannot write output: {e}")))?;
    Ok(Value::Nil)
}

fn greet(args: &[String], out: &mut dyn Write) -> HandlerResult {
    emit(out, format_args!("Hello, {}!", args[0]))
}

fn numbers(args: &[String]) -> Result<(i64, i64), HandlerFault> {
    match (args[0].parse::<i64>(), args[1].parse::<i64>()) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        _ => Err(HandlerFault::new("both inputs must be whole numbers")),
    }
}

fn add(args: &[String], out: &mut dyn Write) -> HandlerResult {
    let (a, b) = numbers(args)?;
    let sum = a
        .checked_add(b)
        .ok_or_else(|| HandlerFault::new("sum is out of range"))?;
    emit(out, format_args!("Sum: {sum}"))
}

fn subtract(args: &[String], out: &mut dyn Write) -> HandlerResult {
    let (a, b) = numbers(args)?;
    let difference = a
        .checked_sub(b)
        .ok_or_else(|| HandlerFault::new("difference is out of range"))?;
    emit(out, format_args!("Difference: {difference}"))
}

/// Parse `NdM` (or `dM` for a single die).
fn parse_dice(dice: &str) -> Result<(u32, u32), HandlerFault> {
    let invalid = || HandlerFault::new(format!("invalid dice \"{dice}\", expected NdM such as 2d6"));
    let lowered = dice.to_lowercase();
    let (count, faces) = lowered.split_once('d').ok_or_else(invalid)?;
    let count = if count.is_empty() {
        1
    } else {
        count.parse::<u32>().map_err(|_| invalid())?
    };
    let faces = faces.parse::<u32>().map_err(|_| invalid())?;
    if !(1..=MAX_DICE).contains(&count) || !(1..=MAX_FACES).contains(&faces) {
        return Err(HandlerFault::new(format!(
            "dice must be between 1d1 and {MAX_DICE}d{MAX_FACES}"
        )));
    }
    Ok((count, faces))
}

fn roll(dice: &str, rng: &mut StdRng, out: &mut dyn Write) -> HandlerResult {
    let (count, faces) = parse_dice(dice)?;
    let rolls: Vec<u32> = (0..count).map(|_| rng.gen_range(1..=faces)).collect();
    let total: u32 = rolls.iter().sum();
    let shown = rolls
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" + ");
    emit(out, format_args!("Rolled {count}d{faces}: {shown} = {total}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, Dispatcher};
    use crate::script::ScriptLoader;

    fn run(line: &str) -> Result<String, DispatchError> {
        let mut registry = CommandRegistry::new(ScriptLoader::default());
        register_builtins(&mut registry, Some(7)).unwrap();
        let mut out = Vec::new();
        Dispatcher::new(&registry).invoke_line(line, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn greet_and_alias() {
        assert_eq!(run("greet Ada").unwrap(), "Hello, Ada!\n");
        assert_eq!(run("hello Ada").unwrap(), "Hello, Ada!\n");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(run("add 2 3").unwrap(), "Sum: 5\n");
        assert_eq!(run("subtract 2 3").unwrap(), "Difference: -1\n");
        assert!(matches!(run("add two 3"), Err(DispatchError::Handler { .. })));
        assert!(matches!(
            run(&format!("add {} 1", i64::MAX)),
            Err(DispatchError::Handler { .. })
        ));
    }

    #[test]
    fn dice_notation() {
        assert_eq!(parse_dice("2d6").unwrap(), (2, 6));
        assert_eq!(parse_dice("D20").unwrap(), (1, 20));
        for bad in ["6", "xd6", "2d", "0d6", "2d0", "101d6"] {
            assert!(parse_dice(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn roll_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mut out = Vec::new();
            roll("3d4", &mut rng, &mut out).unwrap();
            let text = String::from_utf8(out).unwrap();
            let total: u32 = text.trim().rsplit(' ').next().unwrap().parse().unwrap();
            assert!((3..=12).contains(&total), "{text}");
        }
    }
}
