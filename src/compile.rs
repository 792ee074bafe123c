use std::fs;

use colored::*;
use tracing::info;

use crate::analysis::{Analyzer, Resolved};
use crate::errors::ErrorPrinter;
use crate::helper::lex_wrap::ParseResultError;
use crate::tast::Tast;
use crate::types::TypeEnvironment;

/// Front half of a compilation run: lex, parse, build the TAST, resolve.
/// Parse failures stop the run before analysis; analysis failures come back
/// inside the `Resolved` as the aggregate diagnostic list.
pub fn analyze_source(source: &str) -> Result<Resolved, Vec<ParseResultError>> {
    let (ast, parse_errors) = crate::parse::parse_source(source);
    if !parse_errors.is_empty() {
        return Err(parse_errors);
    }

    let (tast, root) = Tast::build(&ast);
    let mut analyzer = Analyzer::new(TypeEnvironment::new(), tast);
    analyzer.analyze_program(root);
    Ok(analyzer.into_resolved(root))
}

pub fn launch(args: &[&str]) {
    if args.is_empty() {
        eprintln!("usage: cxc <file>...");
        return;
    }

    let printer = ErrorPrinter {};
    let mut failed = false;

    for filename in args {
        let source = match fs::read_to_string(filename) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{}: cannot open {}: {}", "error".bright_red().bold(), filename, e);
                failed = true;
                continue;
            }
        };

        info!("compiling {}", filename);

        match analyze_source(&source) {
            Err(parse_errors) => {
                for e in parse_errors.iter() {
                    report_parse_error(&printer, e, &source, filename);
                }
                failed = true;
            }
            Ok(resolved) => {
                if resolved.errors.is_empty() {
                    println!(
                        "{} {} ({} nodes resolved, {} generic instances)",
                        "ok".bright_green().bold(),
                        filename,
                        resolved.tast.len(),
                        resolved.generics.instances().len()
                    );
                } else {
                    for d in resolved.errors.iter() {
                        printer.report(d, &source, filename);
                    }
                    printer.print_bar();
                    println!(
                        "{}: {} error(s) in {}",
                        "failed".bright_red().bold(),
                        resolved.errors.len(),
                        filename
                    );
                    failed = true;
                }
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

fn report_parse_error(
    printer: &ErrorPrinter,
    error: &ParseResultError,
    source: &str,
    filename: &str,
) {
    match error {
        ParseResultError::UnexpectedToken(tw, expected, hint) => {
            println!(
                "{}: unexpected token '{}'{}",
                "error".bright_red().bold(),
                tw.slice,
                hint.map(|h| format!(" ({})", h)).unwrap_or_default()
            );
            if !expected.is_empty() {
                printer.note_line(&format!("expected one of {:?}", expected));
            }
            let lines: Vec<&str> = source.lines().collect();
            printer.print_context(tw.start, tw.end, &lines, filename);
        }
        ParseResultError::EndOfFile => {
            println!("{}: unexpected end of file", "error".bright_red().bold());
        }
        other => {
            println!("{}: {:?}", "error".bright_red().bold(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::analyze_source;
    use crate::analysis::Resolved;
    use crate::errors::DiagnosticKind;
    use crate::tast::tags::{CompilationTag, TagCategory};
    use crate::tast::NodeId;
    use crate::types::CxType;

    fn resolve_ok(source: &str) -> Resolved {
        let resolved = analyze_source(source).expect("source should parse");
        assert!(
            resolved.errors.is_empty(),
            "expected clean resolution, got {:?}",
            resolved.errors
        );
        resolved
    }

    fn resolve_errs(source: &str) -> Resolved {
        let resolved = analyze_source(source).expect("source should parse");
        assert!(!resolved.errors.is_empty(), "expected diagnostics");
        resolved
    }

    /// Every node id in the arena, for tag hunting in assertions.
    fn all_nodes(resolved: &Resolved) -> impl Iterator<Item = NodeId> {
        (0..resolved.tast.len()).map(NodeId)
    }

    fn nodes_with_tag(resolved: &Resolved, category: TagCategory) -> Vec<NodeId> {
        all_nodes(resolved)
            .filter(|&n| resolved.tast.has_tag(n, category))
            .collect()
    }

    #[test]
    fn overload_selection_picks_the_exact_arity() {
        let resolved = resolve_ok(
            "class K {
                 int f(int a) { return a; }
                 int f(int a, int b) { return a; }
             }
             int main() {
                 K k;
                 int x = k.f(3);
                 int y = k.f(1, 2);
                 return x + y;
             }",
        );

        let calls = nodes_with_tag(&resolved, TagCategory::MethodCall);
        assert_eq!(calls.len(), 2);

        // each call site must select the overload whose parameter count
        // matches its own argument count: k.f(3) takes f(int), not f(int,int)
        for call in calls {
            match resolved.tast.find_tag(call, TagCategory::MethodCall) {
                Some(CompilationTag::MethodCall(m)) => {
                    let method = resolved.env.method(*m);
                    let args = resolved
                        .tast
                        .child(call, 2)
                        .map(|seq| resolved.tast.child_count(seq))
                        .unwrap();
                    assert_eq!(method.parameters.len(), args);
                }
                other => panic!("unexpected tag {:?}", other),
            }
        }
    }

    #[test]
    fn overload_without_a_match_is_diagnosed() {
        let resolved = resolve_errs(
            "class K {
                 int f(int a) { return a; }
                 int f(int a, int b) { return a; }
             }
             int main() {
                 K k;
                 int x = k.f(1, 2, 3);
                 return x;
             }",
        );
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::NoMatchingOverload));
    }

    #[test]
    fn virtual_call_is_tagged_for_indirect_dispatch() {
        let resolved = resolve_ok(
            "class Base {
                 virtual int area(int s) { return s; }
                 int direct(int s) { return s; }
             }
             int main() {
                 Base b;
                 int v = b.area(2);
                 int d = b.direct(2);
                 return v + d;
             }",
        );

        let virtuals = nodes_with_tag(&resolved, TagCategory::VirtualMethodCall);
        assert_eq!(virtuals.len(), 1);
        // the virtual tag rides alongside the resolved method tag
        assert!(resolved
            .tast
            .has_tag(virtuals[0], TagCategory::MethodCall));
    }

    #[test]
    fn missing_return_on_one_branch_is_one_error_at_the_function() {
        let resolved = resolve_errs(
            "int f(int x) {
                 if (x > 0) {
                     return 1;
                 }
             }
             int main() { return 0; }",
        );

        let missing: Vec<_> = resolved
            .errors
            .iter()
            .filter(|d| d.kind == DiagnosticKind::MissingReturn)
            .collect();
        assert_eq!(missing.len(), 1);
        assert!(!missing[0].tokens.is_empty(), "pinned to the declaring token");
    }

    #[test]
    fn both_branches_returning_satisfies_the_checker() {
        resolve_ok(
            "int f(int x) {
                 if (x > 0) {
                     return 1;
                 } else {
                     return 2;
                 }
             }
             int main() { return 0; }",
        );
    }

    #[test]
    fn local_shadowing_a_field_wins_and_is_tagged() {
        let resolved = resolve_ok(
            "class K {
                 int value;
                 int get() {
                     char value;
                     value = 'a';
                     return 0;
                 }
             }
             int main() { return 0; }",
        );

        let shadowed = nodes_with_tag(&resolved, TagCategory::ShadowingFieldName);
        assert!(!shadowed.is_empty());
        // the local (char) wins over the field (int)
        for node in shadowed {
            assert_eq!(resolved.tast.ty(node), Some(&CxType::CHAR));
        }
    }

    #[test]
    fn field_reference_without_local_is_untagged() {
        let resolved = resolve_ok(
            "class K {
                 int value;
                 int get() { return value; }
             }
             int main() { return 0; }",
        );
        assert!(nodes_with_tag(&resolved, TagCategory::ShadowingFieldName).is_empty());
    }

    #[test]
    fn generic_instantiation_is_cached_per_type_tuple() {
        let resolved = resolve_ok(
            "generic <T> T pass(T x) { return x; }
             int main() {
                 int a = pass<int>(1);
                 int b = pass<int>(2);
                 double c = pass<double>(1.5);
                 return a + b;
             }",
        );

        // two distinct tuples, three call sites: exactly two instances
        assert_eq!(resolved.generics.instances().len(), 2);

        let tagged = nodes_with_tag(&resolved, TagCategory::GenericCall);
        assert_eq!(tagged.len(), 3);

        let mut int_handles = Vec::new();
        for node in tagged {
            if let Some(CompilationTag::GenericCall(id)) =
                resolved.tast.find_tag(node, TagCategory::GenericCall)
            {
                if resolved.tast.ty(node) == Some(&CxType::INT) {
                    int_handles.push(*id);
                }
            }
        }
        assert_eq!(int_handles.len(), 2);
        assert_eq!(
            int_handles[0], int_handles[1],
            "repeated instantiation must return the identical handle"
        );
    }

    #[test]
    fn generic_instances_anchor_to_their_top_level_declaration() {
        let resolved = resolve_ok(
            "generic <T> T pass(T x) { return x; }
             int main() {
                 return pass<int>(1);
             }",
        );

        assert_eq!(resolved.generics.instances().len(), 1);
        let instance = &resolved.generics.instances()[0];
        // main is the second top-level declaration
        assert_eq!(instance.anchor, 1);
        assert!(!nodes_with_tag(&resolved, TagCategory::InstantiationAnchor).is_empty());
    }

    #[test]
    fn generic_bound_violation_is_diagnosed() {
        let resolved = resolve_errs(
            "class K { }
             generic <T : int> T clamp(T x) { return x; }
             int main() {
                 K k;
                 clamp<K*>(&k);
                 return 0;
             }",
        );
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::IllegalTypeArguments));
    }

    #[test]
    fn constructor_overloads_resolve_and_misses_fail() {
        let resolved = resolve_ok(
            "class P {
                 int x;
                 P(int a) { x = a; }
                 P(int a, int b) { x = a + b; }
             }
             int main() {
                 P* p = new P(1);
                 P* q = new P(1, 2);
                 return 0;
             }",
        );
        assert_eq!(
            nodes_with_tag(&resolved, TagCategory::ConstructorCall).len(),
            2
        );

        let missing = resolve_errs(
            "class P {
                 P(int a) { }
             }
             int main() {
                 P* p = new P(1, 2);
                 return 0;
             }",
        );
        assert!(missing
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::NoConstructor));
    }

    #[test]
    fn duplicate_main_reports_both_tokens() {
        let resolved = resolve_errs(
            "int main() { return 0; }
             int main() { return 1; }",
        );

        let dup: Vec<_> = resolved
            .errors
            .iter()
            .filter(|d| d.kind == DiagnosticKind::MultipleMainDefinitions)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].tokens.len(), 2);
    }

    #[test]
    fn wrong_main_shape_is_rejected() {
        let resolved = resolve_errs("double main() { return 1.0; }");
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::IncorrectMainDefinition));
    }

    #[test]
    fn const_assignment_is_rejected() {
        let resolved = resolve_errs(
            "int main() {
                 const int x = 3;
                 x = 4;
                 return 0;
             }",
        );
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::ConstModification));
    }

    #[test]
    fn assignment_needs_an_lvalue_producing_node() {
        let resolved = resolve_errs(
            "int main() {
                 1 = 2;
                 return 0;
             }",
        );
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::IllegalLValue));
    }

    #[test]
    fn constant_array_sizes_are_folded_into_tags() {
        let resolved = resolve_ok(
            "int main() {
                 int fixed[2 * 8];
                 return 0;
             }",
        );

        let tagged = nodes_with_tag(&resolved, TagCategory::ConstantSize);
        assert_eq!(tagged.len(), 1);
        match resolved.tast.find_tag(tagged[0], TagCategory::ArraySize) {
            Some(CompilationTag::ArraySize { value }) => assert_eq!(*value, 16),
            other => panic!("expected a folded size, got {:?}", other),
        }
    }

    #[test]
    fn runtime_array_sizes_stay_untagged() {
        let resolved = resolve_ok(
            "int main() {
                 int n = 4;
                 int dynamic[n];
                 return 0;
             }",
        );
        assert!(nodes_with_tag(&resolved, TagCategory::ConstantSize).is_empty());
    }

    #[test]
    fn unknown_identifiers_are_fatal_but_siblings_continue() {
        let resolved = resolve_errs(
            "int main() {
                 ghost = 3;
                 int x = 1;
                 return x;
             }",
        );

        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::IdentifierDoesNotExist));
        // the later statement still resolved: its declaration carries a type
        let declared: Vec<_> = (0..resolved.tast.len())
            .map(NodeId)
            .filter(|&n| {
                resolved.tast.kind(n) == crate::ast::AstKind::InitializedDeclaration
                    && resolved.tast.is_typed(n)
            })
            .collect();
        assert!(!declared.is_empty());
    }

    #[test]
    fn inherited_methods_resolve_through_the_parent_chain() {
        let resolved = resolve_ok(
            "class Base {
                 int shared(int a) { return a; }
             }
             class Derived : Base {
                 int own(int a) { return a; }
             }
             int main() {
                 Derived d;
                 return d.shared(1) + d.own(2);
             }",
        );

        let calls = nodes_with_tag(&resolved, TagCategory::MethodCall);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn upcast_assignment_through_pointers_is_accepted() {
        resolve_ok(
            "class Base { }
             class Derived : Base {
                 Derived() { }
             }
             int main() {
                 Base* b = new Derived();
                 return 0;
             }",
        );
    }

    #[test]
    fn indirect_access_tags_ride_on_arrow_syntax() {
        let resolved = resolve_ok(
            "class K {
                 int v;
                 int get() { return v; }
             }
             int main() {
                 K k;
                 K* p = &k;
                 int a = p->get();
                 int b = p->v;
                 return a + b;
             }",
        );
        assert_eq!(nodes_with_tag(&resolved, TagCategory::IndirectMethodCall).len(), 1);
        assert_eq!(nodes_with_tag(&resolved, TagCategory::IndirectFieldGet).len(), 1);
    }

    #[test]
    fn redeclaring_a_method_overload_is_rejected() {
        let resolved = resolve_errs(
            "class K {
                 int f(int a) { return a; }
                 int f(int b) { return b; }
             }
             int main() { return 0; }",
        );
        assert!(resolved
            .errors
            .iter()
            .any(|d| d.kind == DiagnosticKind::Redeclare));
    }

    #[test]
    fn compound_assignment_is_tagged() {
        let resolved = resolve_ok(
            "int main() {
                 int x = 1;
                 x += 2;
                 return x;
             }",
        );
        assert_eq!(
            nodes_with_tag(&resolved, TagCategory::OperatorAssignment).len(),
            1
        );
    }

    #[test]
    fn super_calls_resolve_against_the_parent() {
        let resolved = resolve_ok(
            "class Base {
                 virtual int f(int a) { return a; }
             }
             class Derived : Base {
                 int f(int a) { return super.f(a) + 1; }
             }
             int main() { return 0; }",
        );
        assert_eq!(nodes_with_tag(&resolved, TagCategory::SuperCall).len(), 1);
    }
}
