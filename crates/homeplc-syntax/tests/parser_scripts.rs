use homeplc_syntax::ast::{BinaryOp, Expr, Literal, Scope, Stmt, Target, TypeName};
use homeplc_syntax::parse;

const BLIND: &str = r"
(* Blind controller with a lockout between stop and restart. *)
VAR
    up_edge : R_TRIG;
    down_edge : R_TRIG;
    state : INT := 0;
    since : TIME;
END_VAR

up_edge(CLK := IN.input_up);
down_edge(CLK := IN.input_down);

CASE state OF
    0:
        IF up_edge.Q AND NOW - since >= T#500ms THEN
            state := 1;
            since := NOW;
        END_IF;
    1, 2:
        IF up_edge.Q OR down_edge.Q OR NOW - since >= T#30s THEN
            state := 0;
            since := NOW;
        END_IF;
END_CASE;

OUT.output_up := state = 1;
OUT.output_down := state = 2;
";

#[test]
fn parses_a_complete_controller() {
    let script = parse(BLIND).expect("parse");
    let types: Vec<_> = script.vars.iter().map(|var| var.ty).collect();
    assert_eq!(
        types,
        vec![
            TypeName::RTrig,
            TypeName::RTrig,
            TypeName::Int,
            TypeName::Time
        ]
    );
    assert_eq!(script.body.len(), 5);
    assert_eq!(
        script.assigned_outputs(),
        vec!["output_up", "output_down"]
    );
}

#[test]
fn call_arguments_read_the_input_table() {
    let script = parse(BLIND).expect("parse");
    let Stmt::Call { instance, args, .. } = &script.body[0] else {
        panic!("expected call, got {:?}", script.body[0]);
    };
    assert_eq!(instance, "up_edge");
    assert_eq!(
        args[0].1,
        Expr::Table {
            scope: Scope::Input,
            name: "input_up".into()
        }
    );
}

#[test]
fn comparison_result_assigned_to_output() {
    let script = parse(BLIND).expect("parse");
    let Stmt::Assign { target, value, .. } = &script.body[3] else {
        panic!("expected assignment");
    };
    assert_eq!(*target, Target::Output("output_up".into()));
    assert_eq!(
        *value,
        Expr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(Expr::Name("state".into())),
            right: Box::new(Expr::Literal(Literal::Int(1))),
        }
    );
}

#[test]
fn statement_ranges_cover_their_source() {
    let source = "x := 1;\nIF x > 0 THEN x := 0; END_IF";
    let script = parse(source).expect("parse");
    let first = script.body[0].range();
    let second = script.body[1].range();
    assert_eq!(&source[first], "x := 1;");
    assert_eq!(&source[second], "IF x > 0 THEN x := 0; END_IF");
}

#[test]
fn errors_carry_line_and_column() {
    let err = parse("x := 1;\ny := ;").unwrap_err();
    assert_eq!((err.line, err.column), (2, 6));
    assert_eq!(
        err.to_string(),
        "expected expression, found ';' at line 2, column 6"
    );
}

#[test]
fn member_assignment_is_rejected() {
    let err = parse("VAR t : TON; END_VAR\nt.Q := TRUE;").unwrap_err();
    assert!(err.message.contains("cannot be assigned"));
}
