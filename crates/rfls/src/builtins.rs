//
// builtins.rs
//
// Catalog of the implicitly imported BuiltIn library
//

use std::sync::OnceLock;

use crate::library_doc::{KeywordDoc, LibraryCatalog, BUILTIN_LIBRARY_NAME};

/// (name, arguments, first documentation line)
const BUILTIN_KEYWORDS: &[(&str, &[&str], &str)] = &[
    ("Run Keyword", &["name", "*args"], "Executes the given keyword with the given arguments."),
    ("Run Keyword And Continue On Failure", &["name", "*args"], "Runs the keyword and continues execution even if a failure occurs."),
    ("Run Keyword And Ignore Error", &["name", "*args"], "Runs the given keyword with the given arguments and ignores possible error."),
    ("Run Keyword And Return", &["name", "*args"], "Runs the specified keyword and returns from the enclosing user keyword."),
    ("Run Keyword And Return Status", &["name", "*args"], "Runs the given keyword with given arguments and returns the status as a Boolean value."),
    ("Run Keyword If All Critical Tests Passed", &["name", "*args"], "Runs the given keyword with the given arguments, if all critical tests passed."),
    ("Run Keyword If All Tests Passed", &["name", "*args"], "Runs the given keyword with the given arguments, if all tests passed."),
    ("Run Keyword If Any Critical Tests Failed", &["name", "*args"], "Runs the given keyword with the given arguments, if any critical tests failed."),
    ("Run Keyword If Any Tests Failed", &["name", "*args"], "Runs the given keyword with the given arguments, if one or more tests failed."),
    ("Run Keyword If Test Failed", &["name", "*args"], "Runs the given keyword with the given arguments, if the test failed."),
    ("Run Keyword If Test Passed", &["name", "*args"], "Runs the given keyword with the given arguments, if the test passed."),
    ("Run Keyword If Timeout Occurred", &["name", "*args"], "Runs the given keyword if either a test or a keyword timeout has occurred."),
    ("Run Keyword And Expect Error", &["expected_error", "name", "*args"], "Runs the keyword and checks that the expected error occurred."),
    ("Run Keyword And Return If", &["condition", "name", "*args"], "Runs the specified keyword and returns from the enclosing user keyword if the condition is true."),
    ("Run Keyword Unless", &["condition", "name", "*args"], "Runs the given keyword with the given arguments if condition is false."),
    ("Run Keyword If", &["condition", "name", "*args"], "Runs the given keyword with the given arguments, if condition is true."),
    ("Run Keywords", &["*keywords"], "Executes all the given keywords in a sequence."),
    ("Call Method", &["object", "method_name", "*args", "**kwargs"], "Calls the named method of the given object with the provided arguments."),
    ("Catenate", &["*items"], "Catenates the given items together and returns the resulted string."),
    ("Comment", &["*messages"], "Displays the given messages in the log file as keyword arguments."),
    ("Convert To Boolean", &["item"], "Converts the given item to Boolean true or false."),
    ("Convert To Integer", &["item", "base=None"], "Converts the given item to an integer number."),
    ("Convert To Number", &["item", "precision=None"], "Converts the given item to a floating point number."),
    ("Convert To String", &["item"], "Converts the given item to a Unicode string."),
    ("Create Dictionary", &["*items"], "Creates and returns a dictionary based on the given items."),
    ("Create List", &["*items"], "Returns a list containing given items."),
    ("Evaluate", &["expression", "modules=None", "namespace=None"], "Evaluates the given expression in Python and returns the result."),
    ("Fail", &["msg=None", "*tags"], "Fails the test with the given message and optionally alters its tags."),
    ("Fatal Error", &["msg=None"], "Stops the whole test execution."),
    ("Get Count", &["container", "item"], "Returns and logs how many times item is found from container."),
    ("Get Length", &["item"], "Returns and logs the length of the given item as an integer."),
    ("Get Time", &["format=timestamp", "time_=NOW"], "Returns the given time in the requested format."),
    ("Get Variable Value", &["name", "default=None"], "Returns variable value or default if the variable does not exist."),
    ("Import Library", &["name", "*args"], "Imports a library with the given name and optional arguments."),
    ("Import Resource", &["path"], "Imports a resource file with the given path."),
    ("Import Variables", &["path", "*args"], "Imports a variable file with the given path and optional arguments."),
    ("Length Should Be", &["item", "length", "msg=None"], "Verifies that the length of the given item is correct."),
    ("Log", &["message", "level=INFO", "html=False", "console=False", "repr=False", "formatter=str"], "Logs the given message with the given level."),
    ("Log Many", &["*messages"], "Logs the given messages as separate entries using the INFO level."),
    ("Log To Console", &["message", "stream=STDOUT", "no_newline=False"], "Logs the given message to the console."),
    ("Log Variables", &["level=INFO"], "Logs all variables in the current scope with given log level."),
    ("No Operation", &[], "Does absolutely nothing."),
    ("Pass Execution", &["message", "*tags"], "Skips rest of the current test, setup, or teardown with PASS status."),
    ("Repeat Keyword", &["repeat", "name", "*args"], "Executes the specified keyword multiple times."),
    ("Return From Keyword", &["*return_values"], "Returns from the enclosing user keyword."),
    ("Set Global Variable", &["name", "*values"], "Makes a variable available globally in all tests and suites."),
    ("Set Suite Variable", &["name", "*values", "children=False"], "Makes a variable available everywhere within the scope of the current suite."),
    ("Set Tags", &["*tags"], "Adds given tags for the current test or all tests in a suite."),
    ("Set Test Variable", &["name", "*values"], "Makes a variable available everywhere within the scope of the current test."),
    ("Set Variable", &["*values"], "Returns the given values which can then be assigned to variables."),
    ("Set Variable If", &["condition", "*values"], "Sets variable based on the given condition."),
    ("Should Be Empty", &["item", "msg=None"], "Verifies that the given item is empty."),
    ("Should Be Equal", &["first", "second", "msg=None", "values=True", "ignore_case=False"], "Fails if the given objects are unequal."),
    ("Should Be Equal As Integers", &["first", "second", "msg=None", "values=True", "base=None"], "Fails if objects are unequal after converting them to integers."),
    ("Should Be Equal As Numbers", &["first", "second", "msg=None", "values=True", "precision=6"], "Fails if objects are unequal after converting them to real numbers."),
    ("Should Be Equal As Strings", &["first", "second", "msg=None", "values=True", "ignore_case=False"], "Fails if objects are unequal after converting them to strings."),
    ("Should Be True", &["condition", "msg=None"], "Fails if the given condition is not true."),
    ("Should Contain", &["container", "item", "msg=None", "values=True", "ignore_case=False"], "Fails if container does not contain item one or more times."),
    ("Should Match Regexp", &["string", "pattern", "msg=None", "values=True"], "Fails if string does not match pattern as a regular expression."),
    ("Should Not Be Empty", &["item", "msg=None"], "Verifies that the given item is not empty."),
    ("Should Not Be Equal", &["first", "second", "msg=None", "values=True", "ignore_case=False"], "Fails if the given objects are equal."),
    ("Should Not Be True", &["condition", "msg=None"], "Fails if the given condition is true."),
    ("Should Not Contain", &["container", "item", "msg=None", "values=True", "ignore_case=False"], "Fails if container contains item one or more times."),
    ("Skip", &["msg=Skipped with Skip keyword."], "Skips the rest of the current test."),
    ("Skip If", &["condition", "msg=None"], "Skips the rest of the current test if the condition is True."),
    ("Sleep", &["time_", "reason=None"], "Pauses the test executed for the given time."),
    ("Variable Should Exist", &["name", "msg=None"], "Fails unless the given variable exists within the current scope."),
    ("Wait Until Keyword Succeeds", &["retry", "retry_interval", "name", "*args"], "Runs the specified keyword and retries if it fails."),
];

static BUILTIN_CATALOG: OnceLock<LibraryCatalog> = OnceLock::new();

/// The BuiltIn catalog, built once per process.
pub fn builtin_catalog() -> &'static LibraryCatalog {
    BUILTIN_CATALOG.get_or_init(|| LibraryCatalog {
        name: BUILTIN_LIBRARY_NAME.to_string(),
        doc: "An always available standard library with often needed keywords.".to_string(),
        version: String::new(),
        scope: "GLOBAL".to_string(),
        source: None,
        keywords: BUILTIN_KEYWORDS
            .iter()
            .map(|(name, args, doc)| {
                let mut kw = KeywordDoc::new(*name, BUILTIN_LIBRARY_NAME);
                kw.args = args.iter().map(|a| a.to_string()).collect();
                kw.doc = doc.to_string();
                kw
            })
            .collect(),
        errors: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_doc::MetaKeywordKind;

    #[test]
    fn test_every_meta_keyword_is_in_catalog() {
        let catalog = builtin_catalog();
        for name in crate::library_doc::RUN_KEYWORD_NAMES
            .iter()
            .chain(crate::library_doc::RUN_KEYWORD_WITH_CONDITION_NAMES)
            .chain([&crate::library_doc::RUN_KEYWORD_IF_NAME, &crate::library_doc::RUN_KEYWORDS_NAME])
        {
            let kw = catalog.keyword(name).unwrap_or_else(|| panic!("{name} missing"));
            assert!(kw.meta_kind().is_some(), "{name} not classified");
        }
        assert_eq!(
            catalog.keyword("Run Keyword If").unwrap().meta_kind(),
            Some(MetaKeywordKind::RunKeywordIf)
        );
        assert_eq!(catalog.keyword("Log").unwrap().meta_kind(), None);
    }
}
