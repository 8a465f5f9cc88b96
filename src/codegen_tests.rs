#[cfg(test)]
mod tests {
    use crate::registry::Registries;
    use crate::transform::{transpile, TranspileOptions, TranspileOutput};
    use crate::validate::check_js_syntax;

    const UI_PATH: &str = "Game/UI/test.lua";
    const BATTLE_PATH: &str = "Game/Battle/Skill.lua";

    fn translate_at(source: &str, path: &str) -> TranspileOutput {
        let mut registries = Registries::new();
        transpile(source, path, &mut registries, &TranspileOptions::default())
    }

    fn lua2js_at(source: &str, path: &str) -> String {
        let output = translate_at(source, path);
        assert!(output.is_clean(), "unexpected diagnostics: {:?}", output.diagnostics);
        assert_valid_js(&output.code);
        output.code
    }

    fn lua2js(source: &str) -> String {
        lua2js_at(source, UI_PATH)
    }

    fn assert_valid_js(code: &str) {
        if let Err(error) = check_js_syntax(code) {
            panic!("generated JS does not parse: {}\n---\n{}", error, code);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CALL SITES
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_table_insert_at_index() {
        assert_eq!(
            lua2js("local t = {}\ntable.insert(t, 1, 'a')"),
            "let t = {};\nl2j.table.insert(t, 1, \"a\")"
        );
    }

    #[test]
    fn test_error_statement_throws() {
        assert_eq!(lua2js("error(\"bad\")"), "throw new Error(\"bad\")");
    }

    #[test]
    fn test_error_in_expression_stays_an_expression() {
        let code = lua2js("local x = f() or error('bad')");
        assert!(code.contains("(() => { throw new Error(\"bad\"); })()"));
    }

    #[test]
    fn test_library_calls_are_recorded() {
        let mut registries = Registries::new();
        let output = transpile(
            "local s = string.format('%d', n)\nlocal m = math.max(a, b)\nlocal insert = table.insert",
            UI_PATH,
            &mut registries,
            &TranspileOptions::default(),
        );
        assert_eq!(
            output.code,
            "let s = l2j.string.format(\"%d\", n);\nlet m = l2j.math.max(a, b);\nlet insert = l2j.table.insert"
        );
        let recorded: Vec<&str> = registries.system_functions.iter().map(String::as_str).collect();
        assert_eq!(recorded, vec!["math.max", "string.format", "table.insert"]);
    }

    #[test]
    fn test_string_find_returns_positions() {
        assert_eq!(
            lua2js("local s, e = string.find(str, 'x')"),
            "let [s, e] = l2j.string.findWithRet(str, \"x\")"
        );
        assert_eq!(
            lua2js("local s = string.find(str, 'x')"),
            "let [s] = l2j.string.findWithRet(str, \"x\")"
        );
    }

    #[test]
    fn test_select_and_type() {
        let code = lua2js("local function f(...)\nlocal n = select('#', ...)\nlocal b = select(2, ...)\nend");
        assert!(code.contains("let n = varargs.length"));
        assert!(code.contains("let b = varargs[1]"));

        assert_eq!(
            lua2js("if type(x) == 'table' then end"),
            "if ((l2j.luaType(x) === \"object\")) {}"
        );
    }

    #[test]
    fn test_select_on_named_arguments_is_plain_call() {
        let code = lua2js(
            "local function f(a, b, c)\nlocal n = select('#', a, b)\nlocal s = select(2, a, b, c)\nreturn n, s\nend",
        );
        assert!(code.contains("let n = select(\"#\", a, b)"));
        assert!(code.contains("let s = select(2, a, b, c)"));
        assert!(!code.contains("varargs"));
    }

    #[test]
    fn test_value_type_constructor() {
        assert_eq!(
            lua2js("local v = Vector3(1, 2, 3)"),
            "let v = new CS.UnityEngine.Vector3(1, 2, 3)"
        );
    }

    #[test]
    fn test_add_call_key_forces_explicit_call() {
        assert_eq!(lua2js("listener[2](a, b)"), "listener[2].call(a, b)");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VALUES & PACKING
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_positional_tables_are_one_based() {
        assert_eq!(lua2js("local t = {10, 20, 30}"), "let t = {1: 10, 2: 20, 3: 30}");
        assert_eq!(lua2js("local e = {}"), "let e = {}");
        assert_eq!(lua2js("local k = {a = 1, ['b'] = 2}"), "let k = {a: 1, [\"b\"]: 2}");
        assert_eq!(lua2js("local m = {1, x = 2, 3}"), "let m = {1: 1, x: 2, 2: 3}");
    }

    #[test]
    fn test_unary_and_string_bases_keep_parentheses() {
        assert_eq!(lua2js("local y = (-x).z"), "let y = (-x).z");
        assert_eq!(lua2js("local v = (not t)[k]"), "let v = (!t)[k]");
        assert_eq!(lua2js("local s = (\"a\"):rep(2)"), "let s = (\"a\").rep(2)");
    }

    #[test]
    fn test_vararg_table_converts_array() {
        let code = lua2js("local function f(...)\nlocal t = {1, ...}\nend");
        assert!(code.contains("function f(...varargs)"));
        assert!(code.contains("let t = l2j.convertJsArrayToLuaTable([1, ...varargs])"));
    }

    #[test]
    fn test_multi_value_packing() {
        assert_eq!(
            lua2js("local function f(...) return ... end"),
            "function f(...varargs){return [...varargs]}"
        );
        assert_eq!(lua2js("local function g() return end"), "function g(){return}");
        assert_eq!(lua2js("local function h() return 1, 2 end"), "function h(){return [1, 2]}");
        assert_eq!(lua2js("local a, b = f()"), "let [a, b] = f()");
        assert_eq!(lua2js("local a, b = 1, 2"), "let [a, b] = [1, 2]");
        assert_eq!(lua2js("local a, b = 1"), "let [a, b] = [1]");
        assert_eq!(lua2js("f(a, ...)"), "f(a, ...varargs)");
    }

    #[test]
    fn test_return_nil_and_message_throws() {
        assert_eq!(
            lua2js("local function f() return nil, 'oops' end"),
            "function f(){throw new Error(\"oops\")}"
        );
    }

    #[test]
    fn test_length_and_append() {
        let mut registries = Registries::new();
        let output = transpile(
            "local t = {}\nt[#t + 1] = 5\nlocal n = #t",
            UI_PATH,
            &mut registries,
            &TranspileOptions::default(),
        );
        assert_eq!(
            output.code,
            "let t = {};\nl2j.table.insert(t, 5);\nlet n = l2j.table.length(t)"
        );
        assert!(registries.system_functions.contains("table.insert"));
    }

    #[test]
    fn test_strings_and_operators() {
        assert_eq!(lua2js("local s = [[a`b]]"), "let s = `a\\`b`");
        assert_eq!(lua2js("local q = a // b"), "let q = Math.floor(a / b)");
        assert_eq!(lua2js("local p = a ^ 2"), "let p = (a ** 2)");
        assert_eq!(lua2js("local c = 'a' .. b"), "let c = (\"a\" + b)");
        assert_eq!(lua2js("local ne = a ~= b"), "let ne = (a !== b)");
    }

    #[test]
    fn test_identifier_escaping() {
        assert_eq!(
            lua2js("local class = 1\nlocal new = class"),
            "let _class = 1;\nlet New = _class"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOGICAL OPERATORS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_lua_ternary_in_value_context() {
        assert_eq!(
            lua2js("local ok = a and b or c"),
            "let ok = (l2j.condition(a) ? (b) : (c))"
        );
    }

    #[test]
    fn test_value_context_uses_lua_truthiness() {
        assert_eq!(lua2js("local v = a or 0"), "let v = (l2j.condition(a) ? a : 0)");
        assert_eq!(lua2js("local w = a and b"), "let w = (l2j.condition(a) ? b : a)");
    }

    #[test]
    fn test_value_context_evaluates_left_operand_once() {
        assert_eq!(lua2js("local x = f() or 1"), "let x = l2j.or(f(), () => (1))");
        assert_eq!(lua2js("local y = t.a and t.b"), "let y = l2j.and(t.a, () => (t.b))");
        assert_eq!(lua2js("local z = g() or {}"), "let z = l2j.or(g(), () => ({}))");
    }

    #[test]
    fn test_conditions_keep_native_operators() {
        assert_eq!(lua2js("if a and b then end"), "if ((a && b)) {}");
        assert_eq!(
            lua2js("if a then x() elseif b then y() else z() end"),
            "if (a) {x()}\nelse if (b) {y()}\nelse {z()}"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPERATOR MODE
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_operator_mode_follows_path() {
        assert_eq!(lua2js_at("local d = a + b", BATTLE_PATH), "let d = l2j.add(a, b)");
        assert_eq!(lua2js_at("local d = a + b", UI_PATH), "let d = (a + b)");
        assert_eq!(
            lua2js_at("local d = a + b", "Game/Battle/DataCenter/Unit.lua"),
            "let d = (a + b)"
        );
    }

    #[test]
    fn test_operator_mode_runtime_calls() {
        let code = lua2js_at(
            "local e = a == b\nlocal n = a ~= b\nlocal m = -a\nlocal s = a + 'x'",
            BATTLE_PATH,
        );
        assert_eq!(
            code,
            "let e = l2j.eq(a, b);\nlet n = !l2j.eq(a, b);\nlet m = l2j.neg(a);\nlet s = (a + \"x\")"
        );
    }

    #[test]
    fn test_operator_mode_suspended_in_loop_header() {
        assert_eq!(
            lua2js_at("for i = 1, n - 1 do x = x * i end", BATTLE_PATH),
            "for (let i = 0; i < (n - 1); i = i + 1) {globalThis.x = l2j.mul(x, i)}"
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOPS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_numeric_for_rebases_literal_one() {
        assert_eq!(
            lua2js("for i = 1, 10 do print(i) end"),
            "for (let i = 0; i < 10; i = i + 1) {print(i)}"
        );
        assert_eq!(
            lua2js("for i = 1, 10, -1 do end"),
            "for (let i = 0; i > 10; i = i + -1) {}"
        );
    }

    #[test]
    fn test_numeric_for_keeps_other_bounds_inclusive() {
        assert_eq!(lua2js("for i = 0, n do end"), "for (let i = 0; i <= n; i = i + 1) {}");
        assert_eq!(
            lua2js("for i = n, 1, -1 do end"),
            "for (let i = n; i >= 1; i = i + -1) {}"
        );
    }

    #[test]
    fn test_generic_for_over_pairs() {
        assert_eq!(
            lua2js("for k, v in pairs(t) do print(k, v) end"),
            "for (let [k, v] of l2j.pairs(t)) {print(k, v)}"
        );
        assert_eq!(
            lua2js("for _, v in ipairs(t) do end"),
            "for (let [_, v] of l2j.ipairs(t)) {}"
        );
    }

    #[test]
    fn test_repeat_until() {
        assert_eq!(
            lua2js("local x = 0\nrepeat x = x + 1 until x > 3"),
            "let x = 0;\ndo {x = (x + 1)} while (!((x > 3)))"
        );
    }

    #[test]
    fn test_goto_continue() {
        let code = lua2js(
            "local i = 0\nwhile i < 10 do\ni = i + 1\nif i % 2 == 0 then goto continue end\nprint(i)\n::continue::\nend",
        );
        assert!(code.contains("{continue}"));
        assert!(!code.contains("::"));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DECLARATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_placeholder_locals_get_suffixes() {
        assert_eq!(lua2js("local _ = 1\nlocal _ = 2"), "let _ = 1;\nlet _1 = 2");
    }

    #[test]
    fn test_placeholder_parameters_share_the_counter() {
        assert_eq!(
            lua2js("local function f(_, _)\nlocal _ = 1\nreturn _\nend"),
            "function f(_, _1){let _2 = 1;\nreturn _2}"
        );
    }

    #[test]
    fn test_local_function_names_are_declarations() {
        assert_eq!(lua2js("local function g() end\nlocal g = 1"), "function g(){};\ng = 1");
        assert_eq!(
            lua2js("local g = 1\nlocal function g() return g end"),
            "let g = 1;\ng = function (){return g}"
        );
    }

    #[test]
    fn test_shadow_reading_itself_is_renamed() {
        assert_eq!(
            lua2js("local a = 1\ndo local a = a + 1 print(a) end\nprint(a)"),
            "let a = 1;\n{let a_1 = (a + 1);\nprint(a_1)};\nprint(a)"
        );
        assert_eq!(lua2js("local x = x or {}"), "let x_1 = (l2j.condition(x) ? x : {})");
        assert_eq!(lua2js("local print = print"), "let print = globalThis.print");
    }

    #[test]
    fn test_duplicate_locals_drop_keyword() {
        assert_eq!(lua2js("local a = 1\nlocal a = 2"), "let a = 1;\na = 2");
        assert_eq!(lua2js("local a\nlocal a"), "let a;\na = undefined");
        assert_eq!(
            lua2js("local a = 1\nlocal a, b = 2, 3"),
            "let a = 1;\nlet b;\n[a, b] = [2, 3]"
        );
    }

    #[test]
    fn test_global_functions_publish_to_g() {
        assert_eq!(
            lua2js("function helper() end"),
            "function helper(){}\n_G.helper = helper;\n"
        );
    }

    #[test]
    fn test_global_assignment_in_function_uses_global_this() {
        let mut registries = Registries::new();
        let output = transpile(
            "function init() Count = 0 end",
            UI_PATH,
            &mut registries,
            &TranspileOptions::default(),
        );
        assert_eq!(
            output.code,
            "function init(){globalThis.Count = 0}\n_G.init = init;\n"
        );
        assert!(registries.is_initialized_global("Count"));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COMMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_comments_emitted_once_in_order() {
        let source = "-- header\nlocal a = 1 -- trailing\n\n--[[ block\ncomment ]]\nlocal b = 2\n-- tail";
        let code = lua2js(source);

        let markers = ["// header", "// trailing", "/* block\ncomment */", "// tail"];
        let mut last = 0;
        for marker in markers {
            assert_eq!(code.matches(marker).count(), 1, "{} in\n{}", marker, code);
            let at = code.find(marker).unwrap();
            assert!(at >= last, "{} out of order in\n{}", marker, code);
            last = at;
        }
        assert!(code.contains("let a = 1"));
        assert!(code.contains("let b = 2"));
    }

    #[test]
    fn test_blank_lines_are_preserved() {
        assert_eq!(lua2js("local a = 1\n\n\nlocal b = 2"), "let a = 1;\n\n\nlet b = 2");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONTAINED FAILURES
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_unsupported_goto_is_contained() {
        let output = translate_at("goto done\nlocal a = 1\n::done::", UI_PATH);
        assert_eq!(output.diagnostics.len(), 2);
        assert!(output.code.starts_with("/*\n"));
        assert!(output.code.contains("/* Unsupported goto target: done */"));
        assert!(output.code.contains("let a = 1"));
        assert_valid_js(&output.code);
    }

    #[test]
    fn test_unsupported_iterator_is_contained() {
        let output = translate_at("for k, v in next, t do end\nprint(1)", UI_PATH);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output.diagnostics[0].message.contains("Unsupported iterator"));
        assert!(output.code.contains("print(1)"));
        assert_valid_js(&output.code);
    }

    #[test]
    fn test_return_in_chunk_level_block_is_contained() {
        let output = translate_at("if x then return end\nprint(1)", UI_PATH);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(output
            .code
            .contains("if (x) {/* Unsupported ReturnStatement outside a function body */}"));
        assert!(output.code.contains("print(1)"));
        assert_valid_js(&output.code);
    }

    #[test]
    fn test_commonjs_export() {
        let mut registries = Registries::new();
        let options = TranspileOptions {
            as_esm: false,
            ..TranspileOptions::default()
        };
        let output = transpile("local x = 1\nreturn x", UI_PATH, &mut registries, &options);
        assert_eq!(output.code, "let x = 1;\nexports.default = x");
    }

    #[test]
    fn test_larger_module_is_valid_js() {
        let source = r#"
-- Inventory helpers
local Inventory = {}

local function count(items, ...)
    local total = 0
    for i = 1, #items do
        total = total + (items[i].n or 1)
    end
    local extra = select('#', ...)
    return total + extra
end

function Inventory:add(item)
    self.items = self.items or {}
    self.items[#self.items + 1] = item
    self.onChange = function() return count(self.items) end
    if not item.name then
        error("missing name")
    end
end

function Inventory.describe(item)
    return string.format("%s x%d", item.name, item.n or 1)
end

return Inventory
"#;
        let code = lua2js_at(source, "Game/UI/Inventory.lua");
        assert!(code.contains("let Inventory = l2j.createClass(\"Inventory\")"));
        assert!(code.contains("Inventory.prototype.add = function (item){let thisArg = this;"));
        assert!(code.contains("l2j.table.insert(this.items, item)"));
        assert!(code.contains("l2j.finishClass(Inventory);\nexport default Inventory"));
    }
}
