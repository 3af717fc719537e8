//! Reading rotation: decides whose turn is next from the most recent reader.
//!
//! Children take turns in name order. After the last child a parent is
//! suggested, and a parent's turn always hands the cycle back to the first
//! child. The function is pure; callers fetch people and history themselves.

use crate::domain::person::{Person, PersonRole};

/// Returns the next reader, or `None` when nobody with the follows role exists.
///
/// `people` must already be sorted by name (the storage layer guarantees it).
/// `last_actor` is empty when no session has been recorded yet. An unknown
/// name restarts the cycle instead of failing.
pub fn next_actor(people: &[Person], last_actor: &str) -> Option<String> {
    let follows = names_with_role(people, PersonRole::Follows);
    let leads = names_with_role(people, PersonRole::Leads);

    let first = *follows.first()?;
    if last_actor.is_empty() || leads.contains(&last_actor) {
        return Some(first.to_owned());
    }

    let Some(position) = follows.iter().position(|name| *name == last_actor) else {
        return Some(first.to_owned());
    };

    if let Some(next) = follows.get(position + 1) {
        return Some((*next).to_owned());
    }

    match leads.as_slice() {
        [] => Some(first.to_owned()),
        [only] => Some((*only).to_owned()),
        [a, b, ..] => Some(format!("{a} or {b}")),
    }
}

fn names_with_role(people: &[Person], role: PersonRole) -> Vec<&str> {
    people.iter().filter(|person| person.role == role).map(|person| person.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::next_actor;
    use crate::domain::person::{Person, PersonId, PersonRole};

    fn person(name: &str, role: PersonRole) -> Person {
        Person { id: PersonId(format!("P-{name}")), name: name.to_owned(), role }
    }

    fn family(children: &[&str], parents: &[&str]) -> Vec<Person> {
        let mut people: Vec<Person> = children
            .iter()
            .map(|name| person(name, PersonRole::Follows))
            .chain(parents.iter().map(|name| person(name, PersonRole::Leads)))
            .collect();
        people.sort_by(|left, right| left.name.cmp(&right.name));
        people
    }

    #[test]
    fn empty_people_has_no_rotation() {
        assert_eq!(next_actor(&[], ""), None);
    }

    #[test]
    fn parents_only_has_no_rotation() {
        let people = family(&[], &["Dad", "Mom"]);
        assert_eq!(next_actor(&people, ""), None);
        assert_eq!(next_actor(&people, "Mom"), None);
    }

    #[test]
    fn no_history_starts_with_first_child() {
        let people = family(&["Charlie", "Alice", "Bob"], &["Mom"]);
        assert_eq!(next_actor(&people, "").as_deref(), Some("Alice"));
    }

    #[test]
    fn children_rotate_in_name_order() {
        let people = family(&["Alice", "Bob", "Charlie"], &[]);
        assert_eq!(next_actor(&people, "Alice").as_deref(), Some("Bob"));
        assert_eq!(next_actor(&people, "Bob").as_deref(), Some("Charlie"));
    }

    #[test]
    fn last_child_wraps_when_there_are_no_parents() {
        let people = family(&["Alice", "Bob"], &[]);
        assert_eq!(next_actor(&people, "Bob").as_deref(), Some("Alice"));
    }

    #[test]
    fn single_child_without_parents_reads_again() {
        let people = family(&["Alice"], &[]);
        assert_eq!(next_actor(&people, "Alice").as_deref(), Some("Alice"));
    }

    #[test]
    fn family_scenario_follows_child_parent_child() {
        let people = family(&["Alice", "Bob"], &["Mom"]);
        assert_eq!(next_actor(&people, "").as_deref(), Some("Alice"));
        assert_eq!(next_actor(&people, "Bob").as_deref(), Some("Mom"));
        assert_eq!(next_actor(&people, "Mom").as_deref(), Some("Alice"));
    }

    #[test]
    fn two_parents_are_offered_as_a_choice() {
        let people = family(&["Alice", "Bob"], &["Mom", "Dad", "Grandma"]);
        assert_eq!(next_actor(&people, "Bob").as_deref(), Some("Dad or Grandma"));
    }

    #[test]
    fn any_parent_resets_to_first_child() {
        let people = family(&["Alice", "Bob"], &["Dad", "Mom"]);
        assert_eq!(next_actor(&people, "Dad").as_deref(), Some("Alice"));
        assert_eq!(next_actor(&people, "Mom").as_deref(), Some("Alice"));
    }

    #[test]
    fn unknown_reader_restarts_cycle() {
        let people = family(&["Alice", "Bob"], &["Mom"]);
        assert_eq!(next_actor(&people, "Grandpa").as_deref(), Some("Alice"));
    }

    #[test]
    fn repeated_application_returns_to_first_child() {
        let child_sets: [&[&str]; 4] =
            [&["Alice"], &["Alice", "Bob"], &["Alice", "Bob", "Charlie"], &["Zed", "Amy", "Kim"]];
        let parent_sets: [&[&str]; 3] = [&[], &["Mom"], &["Dad", "Mom"]];

        for children in child_sets {
            for parents in parent_sets {
                let people = family(children, parents);
                let first = next_actor(&people, "").expect("children present");
                let mut current = first.clone();
                let mut revisited = false;
                for _ in 0..(people.len() + 2) {
                    current = next_actor(&people, &current).expect("children present");
                    if current == first {
                        revisited = true;
                        break;
                    }
                }
                assert!(revisited, "cycle did not close for {children:?} / {parents:?}");
            }
        }
    }
}
